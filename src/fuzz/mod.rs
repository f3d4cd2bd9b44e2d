pub mod classify;
pub mod path_gen;

pub use classify::{discloses_cache_info, is_interesting, CACHE_DISCLOSURE_HEADERS};
pub use path_gen::PathGenerator;
