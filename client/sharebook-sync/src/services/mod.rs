//! Composite operations that touch more than one collaborator

pub mod comments;
pub mod posts;
pub mod profile;

pub use comments::CommentService;
pub use posts::PostService;
pub use profile::ProfileService;
