#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use recon_image as image;

#[doc(inline)]
pub use recon_imgproc as imgproc;

#[doc(inline)]
pub use recon_3d as k3d;

#[doc(inline)]
pub use recon_pipeline as pipeline;
