//! Asset ingestion core.
//!
//! Domain types shared by the source adapters, the persistence sink and the
//! ingestion coordinator:
//!
//! - [`EntityId`]: canonical ticker identity per venue
//! - [`RawRecord`] / [`CanonicalRecord`]: records before and after normalization
//! - [`SchemaRegistry`]: data-driven table schemas with field alias tables
//! - [`Normalizer`]: alias resolution and type coercion
//! - [`FailureKind`]: the failure taxonomy reported in run summaries

pub mod error;
pub mod normalize;
pub mod record;
pub mod schema;
pub mod symbol;

pub use error::{FailureKind, ValidationError};
pub use normalize::{parse_date, parse_number, Normalizer};
pub use record::{CanonicalRecord, RawRecord, Value};
pub use schema::{
    AliasOverrides, FieldKind, FieldSpec, Schema, SchemaError, SchemaId, SchemaRegistry,
    LATEST_PRICES, SET_SYMBOLS, SP500_SYMBOLS, STOCK_PRICES,
};
pub use symbol::{canonical_symbol, EntityId, SymbolError, Venue};
