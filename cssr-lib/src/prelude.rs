pub use crate::error::{Error, Result, Stage};
