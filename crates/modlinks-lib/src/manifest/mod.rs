pub mod api_links;
pub mod document;
pub mod mod_links;

pub use api_links::*;
pub use document::*;
pub use mod_links::*;
