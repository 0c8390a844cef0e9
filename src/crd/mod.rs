//! Custom Resource Definitions for the Convoy operator

mod app_instance;
pub mod types;


pub use app_instance::{
    AppInstance, AppInstanceSpec, AppInstanceStatus, SpecValidationError, DEFAULT_PORT,
    DEFAULT_REPLICAS,
};
pub use types::*;
