use std::io::{BufWriter, Write};
use std::path::Path;

use super::PlyError;
use crate::pointcloud::PointCloud;

/// Encoding of the vertex data of a PLY file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlyFormat {
    /// Human readable text.
    Ascii,
    /// Little endian binary.
    BinaryLittleEndian,
}

impl PlyFormat {
    fn header_name(&self) -> &'static str {
        match self {
            PlyFormat::Ascii => "ascii",
            PlyFormat::BinaryLittleEndian => "binary_little_endian",
        }
    }
}

/// Encode a point cloud as PLY into any writer.
///
/// Points are written as `double` x, y, z properties, followed by `uchar` red,
/// green, blue properties when the cloud carries colors.
pub fn encode_ply<W: Write>(
    writer: &mut W,
    pointcloud: &PointCloud,
    format: PlyFormat,
) -> Result<(), PlyError> {
    let colors = pointcloud.colors();

    writeln!(writer, "ply")?;
    writeln!(writer, "format {} 1.0", format.header_name())?;
    writeln!(writer, "comment sparse two-view reconstruction")?;
    writeln!(writer, "element vertex {}", pointcloud.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(writer, "property double {axis}")?;
    }
    if colors.is_some() {
        for channel in ["red", "green", "blue"] {
            writeln!(writer, "property uchar {channel}")?;
        }
    }
    writeln!(writer, "end_header")?;

    for (i, p) in pointcloud.points().iter().enumerate() {
        let color = colors.and_then(|c| c.get(i));
        match format {
            PlyFormat::Ascii => {
                write!(writer, "{} {} {}", p[0], p[1], p[2])?;
                if let Some(c) = color {
                    write!(writer, " {} {} {}", c[0], c[1], c[2])?;
                }
                writeln!(writer)?;
            }
            PlyFormat::BinaryLittleEndian => {
                for v in p {
                    writer.write_all(&v.to_le_bytes())?;
                }
                if let Some(c) = color {
                    writer.write_all(c)?;
                }
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Write a point cloud to an ASCII PLY file.
///
/// # Arguments
///
/// * `path` - The path of the file to create.
/// * `pointcloud` - The point cloud to write.
pub fn write_ply_ascii(path: impl AsRef<Path>, pointcloud: &PointCloud) -> Result<(), PlyError> {
    write_ply(path, pointcloud, PlyFormat::Ascii)
}

/// Write a point cloud to a binary little endian PLY file.
pub fn write_ply_binary(path: impl AsRef<Path>, pointcloud: &PointCloud) -> Result<(), PlyError> {
    write_ply(path, pointcloud, PlyFormat::BinaryLittleEndian)
}

fn write_ply(
    path: impl AsRef<Path>,
    pointcloud: &PointCloud,
    format: PlyFormat,
) -> Result<(), PlyError> {
    let file = std::fs::File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_ply(&mut writer, pointcloud, format)?;
    log::debug!(
        "wrote {} points to {}",
        pointcloud.len(),
        path.as_ref().display()
    );
    Ok(())
}
