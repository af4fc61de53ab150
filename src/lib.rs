pub mod augment;
pub mod error;
pub mod gate;
pub mod gradcafe;
pub mod persistent;

mod utils;

pub use error::{CrawlerError, MalformedEntry};
pub use gradcafe::{AdmissionRecord, GradCafeCrawler};
pub use persistent::{Persistent, RecordStore};
