mod artifact;
mod backend;
mod context;
mod in_context;
mod linalg;
mod mitra;
mod tabicl;
mod tabpfn;

pub use artifact::Artifact;
pub use backend::{Backend, BackendKind, FitStats, Output};
pub use context::Context;
pub use in_context::{FineTune, InContextBackend, InContextOptions, Learner, OptimizerKind};
pub use mitra::Mitra;
pub use tabicl::TabIcl;
pub use tabpfn::TabPfnV2;
