pub mod handlers;
pub mod policy;
pub mod prompts;
pub mod reply;
pub mod sessions;
