// Database module - SQLite cache for downloaded market data

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

use crate::pricing::{CompanyProfile, PricePoint};

/// Get the default cache path (~/.perfana/cache.db)
pub fn get_default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let perfana_dir = PathBuf::from(home).join(".perfana");

    // Create directory if it doesn't exist
    std::fs::create_dir_all(&perfana_dir).context("Failed to create .perfana directory")?;

    Ok(perfana_dir.join("cache.db"))
}

/// Open the cache database, creating tables on first use
pub fn open_db(db_path: Option<PathBuf>) -> Result<Connection> {
    let path = match db_path {
        Some(path) => path,
        None => get_default_db_path()?,
    };
    debug!("Opening price cache at {:?}", path);
    let conn = Connection::open(&path).context(format!("Failed to open database at {:?}", path))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Create cache tables if missing
pub fn init_schema(conn: &Connection) -> Result<()> {
    let schema_sql = include_str!("schema.sql");
    conn.execute_batch(schema_sql)
        .context("Failed to execute schema")?;
    Ok(())
}

/// Cached prices for `[from, to]`, or `None` if the range was never fully fetched
pub fn load_cached_history(
    conn: &Connection,
    symbol: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Option<Vec<PricePoint>>> {
    let covered: Option<i64> = conn
        .query_row(
            "SELECT id FROM price_ranges
             WHERE symbol = ?1 AND from_date <= ?2 AND to_date >= ?3
             LIMIT 1",
            params![symbol, from, to],
            |row| row.get(0),
        )
        .optional()?;

    if covered.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT price_date, close, adj_close FROM price_history
         WHERE symbol = ?1 AND price_date >= ?2 AND price_date <= ?3
         ORDER BY price_date",
    )?;
    let points = stmt
        .query_map(params![symbol, from, to], |row| {
            Ok(PricePoint {
                date: row.get(0)?,
                close: get_decimal_value(row, 1)?,
                adj_close: get_decimal_value(row, 2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if points.is_empty() {
        return Ok(None);
    }
    Ok(Some(points))
}

/// Store fetched prices.
///
/// The range is only marked as covered up to yesterday, so today's bar is
/// always fetched again.
pub fn save_history(
    conn: &mut Connection,
    symbol: &str,
    from: NaiveDate,
    to: NaiveDate,
    points: &[PricePoint],
) -> Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO price_history (symbol, price_date, close, adj_close)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for point in points {
            stmt.execute(params![
                symbol,
                point.date,
                point.close.to_string(),
                point.adj_close.to_string(),
            ])?;
        }
    }

    let yesterday = Utc::now().date_naive() - Duration::days(1);
    let covered_to = to.min(yesterday);
    if covered_to >= from {
        tx.execute(
            "INSERT INTO price_ranges (symbol, from_date, to_date) VALUES (?1, ?2, ?3)",
            params![symbol, from, covered_to],
        )?;
    }
    tx.commit()?;

    info!("Cached {} prices for {}", points.len(), symbol);
    Ok(())
}

pub fn load_profile(conn: &Connection, symbol: &str) -> Result<Option<CompanyProfile>> {
    let profile = conn
        .query_row(
            "SELECT sector, industry, country FROM company_profiles WHERE symbol = ?1",
            [symbol],
            |row| {
                Ok(CompanyProfile {
                    sector: row.get(0)?,
                    industry: row.get(1)?,
                    country: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}

pub fn save_profile(conn: &Connection, symbol: &str, profile: &CompanyProfile) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO company_profiles (symbol, sector, industry, country)
         VALUES (?1, ?2, ?3, ?4)",
        params![symbol, profile.sector, profile.industry, profile.country],
    )?;
    Ok(())
}

/// Helper to read Decimal from SQLite (handles both INTEGER, REAL and TEXT)
pub fn get_decimal_value(row: &rusqlite::Row, idx: usize) -> Result<Decimal, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    match row.get_ref(idx)? {
        ValueRef::Text(bytes) => {
            let s = std::str::from_utf8(bytes)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Decimal::from_str(s).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => {
            Decimal::try_from(f).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        }
        _ => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "decimal".to_string(),
            rusqlite::types::Type::Null,
        )),
    }
}
