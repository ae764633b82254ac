pub mod envelope;
pub mod error;

pub use envelope::{Envelope, FIELD_FINAL, FIELD_ID, FIELD_NEED, FIELD_SOLUTION};
pub use error::{EnvelopeError, Result};
