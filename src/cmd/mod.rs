//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `project`  | `Init`           |
//! | `serve`    | `Serve`          |
//! | `jobs`     | `Jobs`, `Show`   |

pub mod jobs;
pub mod project;
pub mod serve;

pub use jobs::{cmd_jobs, cmd_show};
pub use project::cmd_init;
pub use serve::cmd_serve;
