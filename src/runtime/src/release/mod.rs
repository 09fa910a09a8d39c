//! Release preparation: digest resolution, composition and hand-off.

pub mod compose;
pub mod pipeline;
pub mod resolver;
pub mod submit;

pub use compose::{Clock, ReleaseComposer};
pub use pipeline::{DeployTarget, ReleasePipeline, VerifiableBuilds, VerifiedRelease};
pub use resolver::{DigestResolver, ResolvedImage};
pub use submit::ReleaseSubmitter;
