mod clear;
mod get;
mod prune;
mod remove;
mod set;
mod show;
mod status;
mod unlock;

pub use clear::cmd_clear;
pub use get::cmd_get;
pub use prune::cmd_prune;
pub use remove::cmd_remove;
pub use set::cmd_set;
pub use show::cmd_show;
pub use status::cmd_status;
pub use unlock::cmd_unlock;
