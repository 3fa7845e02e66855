//! Domain types - window state, policy and decisions.

mod policy;
mod verdict;
mod window;

pub use policy::FloodPolicy;
pub use verdict::Verdict;
pub use window::WindowRecord;
