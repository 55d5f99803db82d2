//! Backend dispatch macro.
//!
//! `DbPool`, `DbTransaction` and `DbConnection` all wrap one sqlx type per
//! backend. Most of their methods do the same thing in every arm, only with a
//! different concrete type; the macro writes those arms.

/// Apply the same body to every backend variant of a wrapper enum.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(self, DbPool, p => p.close().await)
/// ```
///
/// expands to a `match` with one `MySql(p)`, `Postgres(p)` and `SQLite(p)`
/// arm, each type-checked against its own inner type.
#[macro_export]
macro_rules! impl_db_dispatch {
    ($value:expr, $wrapper:ident, $inner:ident => $body:expr) => {
        match $value {
            $wrapper::MySql($inner) => $body,
            $wrapper::Postgres($inner) => $body,
            $wrapper::SQLite($inner) => $body,
        }
    };
}

pub use impl_db_dispatch;
