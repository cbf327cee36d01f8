mod kernels;
pub use kernels::*;

mod ops;
pub use ops::*;

mod separable_filter;
pub use separable_filter::*;
