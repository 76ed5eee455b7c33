pub mod gazetteer;
pub mod phone_api;
pub mod run_log;

pub use gazetteer::GazetteerResolver;
pub use phone_api::HttpPhoneVerifier;
pub use run_log::{EventKind, RunLog};
