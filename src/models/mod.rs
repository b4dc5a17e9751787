pub mod earnings;
pub mod paper;
pub mod payment;
pub mod review;
pub mod user;

pub use earnings::*;
pub use paper::*;
pub use payment::*;
pub use review::*;
pub use user::*;
