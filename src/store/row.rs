//! Row decoding for the `customers` table

use crate::{Customer, error::DecodeError};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::Row;

/// Decode one result row into a `Customer`
///
/// Expects the `id`, `first_name` and `last_name` columns; any missing column
/// or type mismatch is reported with the offending column name.
pub fn decode_customer(row: &SqliteRow) -> Result<Customer, DecodeError> {
    Ok(Customer {
        id: column(row, "id")?,
        first_name: column(row, "first_name")?,
        last_name: column(row, "last_name")?,
    })
}

fn column<'r, T>(row: &'r SqliteRow, name: &'static str) -> Result<T, DecodeError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|source| DecodeError { column: name, source })
}
