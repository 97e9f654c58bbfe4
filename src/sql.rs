use std::fmt::Debug;

use serde::{Serialize, Deserialize};
use tokio_postgres::{Error as PgError};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{self, ToSql};

pub type PgJson<T> = types::Json<T>;

pub type ParamsValue<'a> = &'a (dyn ToSql + Sync);
pub type ParamsVec<'a> = Vec<&'a (dyn ToSql + Sync)>;

/// pushes a value and returns its 1 based placeholder index
pub fn push_param<'a>(params: &mut ParamsVec<'a>, v: ParamsValue<'a>) -> usize {
    params.push(v);
    params.len()
}

#[inline]
pub fn de_from_sql<T>(value: PgJson<T>) -> T
where
    T: for<'de> Deserialize<'de>
{
    value.0
}

#[inline]
pub fn ser_to_sql<T>(value: &T) -> PgJson<&T>
where
    T: Serialize + Debug
{
    types::Json(value)
}

/// the name of the violated unique constraint, if that is what failed
pub fn unique_constraint_error(error: &PgError) -> Option<&str> {
    let db_error = error.as_db_error()?;

    if *db_error.code() == SqlState::UNIQUE_VIOLATION {
        db_error.constraint()
    } else {
        None
    }
}
