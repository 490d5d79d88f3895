//! Typed PRAGMA helpers.
//!
//! Every setter reads the engine's adopted state back, because the engine may
//! silently reject a request (WAL on an in-memory database stays `memory`,
//! page-size changes are deferred until VACUUM).

use std::str::FromStr;

use crate::connection::Connection;
use crate::{Error, Result, Value};

/// Journal mode of a database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "delete",
            JournalMode::Truncate => "truncate",
            JournalMode::Persist => "persist",
            JournalMode::Memory => "memory",
            JournalMode::Wal => "wal",
            JournalMode::Off => "off",
        }
    }
}

impl FromStr for JournalMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<JournalMode, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(JournalMode::Delete),
            "truncate" => Ok(JournalMode::Truncate),
            "persist" => Ok(JournalMode::Persist),
            "memory" => Ok(JournalMode::Memory),
            "wal" => Ok(JournalMode::Wal),
            "off" => Ok(JournalMode::Off),
            _ => Err(()),
        }
    }
}

/// Durability level of the `synchronous` pragma.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Synchronous {
    Off = 0,
    Normal = 1,
    Full = 2,
    Extra = 3,
}

impl TryFrom<i64> for Synchronous {
    type Error = ();

    fn try_from(v: i64) -> std::result::Result<Synchronous, Self::Error> {
        match v {
            0 => Ok(Synchronous::Off),
            1 => Ok(Synchronous::Normal),
            2 => Ok(Synchronous::Full),
            3 => Ok(Synchronous::Extra),
            _ => Err(()),
        }
    }
}

/// Where temporary tables and indices are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TempStore {
    Default = 0,
    File = 1,
    Memory = 2,
}

impl TryFrom<i64> for TempStore {
    type Error = ();

    fn try_from(v: i64) -> std::result::Result<TempStore, Self::Error> {
        match v {
            0 => Ok(TempStore::Default),
            1 => Ok(TempStore::File),
            2 => Ok(TempStore::Memory),
            _ => Err(()),
        }
    }
}

/// Auto-vacuum mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoVacuum {
    None = 0,
    Full = 1,
    Incremental = 2,
}

impl TryFrom<i64> for AutoVacuum {
    type Error = ();

    fn try_from(v: i64) -> std::result::Result<AutoVacuum, Self::Error> {
        match v {
            0 => Ok(AutoVacuum::None),
            1 => Ok(AutoVacuum::Full),
            2 => Ok(AutoVacuum::Incremental),
            _ => Err(()),
        }
    }
}

impl Connection {
    fn pragma_value(&self, pragma: &str) -> Result<Value> {
        let row = self
            .query_one(&format!("PRAGMA {pragma}"), ())?
            .ok_or_else(|| Error::Misuse(format!("PRAGMA {pragma} returned no row")))?;
        row.get(0)
            .cloned()
            .ok_or_else(|| Error::Misuse(format!("PRAGMA {pragma} returned no column")))
    }

    fn pragma_int(&self, pragma: &str) -> Result<i64> {
        match self.pragma_value(pragma)? {
            Value::Integer(i) => Ok(i),
            other => Err(Error::TypeMismatch {
                expected: "integer",
                actual: other.type_name(),
            }),
        }
    }

    fn pragma_text(&self, pragma: &str) -> Result<String> {
        match self.pragma_value(pragma)? {
            Value::Text(s) => Ok(s),
            other => Err(Error::TypeMismatch {
                expected: "text",
                actual: other.type_name(),
            }),
        }
    }

    pub fn journal_mode(&self) -> Result<JournalMode> {
        let mode = self.pragma_text("journal_mode")?;
        mode.parse()
            .map_err(|_| Error::Misuse(format!("unknown journal mode `{mode}`")))
    }

    /// Request a journal mode. Returns the mode the engine actually adopted,
    /// which may differ (an in-memory database cannot enter WAL).
    pub fn set_journal_mode(&self, mode: JournalMode) -> Result<JournalMode> {
        let adopted = self.pragma_text(&format!("journal_mode = {}", mode.as_str()))?;
        adopted
            .parse()
            .map_err(|_| Error::Misuse(format!("unknown journal mode `{adopted}`")))
    }

    pub fn synchronous(&self) -> Result<Synchronous> {
        let v = self.pragma_int("synchronous")?;
        Synchronous::try_from(v)
            .map_err(|_| Error::Misuse(format!("unexpected synchronous level {v}")))
    }

    pub fn set_synchronous(&self, level: Synchronous) -> Result<Synchronous> {
        self.exec_raw(&format!("PRAGMA synchronous = {}", level as i64))?;
        self.synchronous()
    }

    pub fn foreign_keys(&self) -> Result<bool> {
        Ok(self.pragma_int("foreign_keys")? != 0)
    }

    pub fn set_foreign_keys(&self, on: bool) -> Result<bool> {
        self.exec_raw(&format!("PRAGMA foreign_keys = {}", on as i64))?;
        self.foreign_keys()
    }

    /// Suggested page-cache size. Positive counts pages; negative means
    /// kibibytes.
    pub fn cache_size(&self) -> Result<i32> {
        Ok(self.pragma_int("cache_size")? as i32)
    }

    pub fn set_cache_size(&self, size: i32) -> Result<i32> {
        self.exec_raw(&format!("PRAGMA cache_size = {size}"))?;
        self.cache_size()
    }

    pub fn temp_store(&self) -> Result<TempStore> {
        let v = self.pragma_int("temp_store")?;
        TempStore::try_from(v).map_err(|_| Error::Misuse(format!("unexpected temp_store {v}")))
    }

    pub fn set_temp_store(&self, mode: TempStore) -> Result<TempStore> {
        self.exec_raw(&format!("PRAGMA temp_store = {}", mode as i64))?;
        self.temp_store()
    }

    pub fn auto_vacuum(&self) -> Result<AutoVacuum> {
        let v = self.pragma_int("auto_vacuum")?;
        AutoVacuum::try_from(v).map_err(|_| Error::Misuse(format!("unexpected auto_vacuum {v}")))
    }

    /// Takes effect for the whole file only before the first table is
    /// created, or after a VACUUM.
    pub fn set_auto_vacuum(&self, mode: AutoVacuum) -> Result<AutoVacuum> {
        self.exec_raw(&format!("PRAGMA auto_vacuum = {}", mode as i64))?;
        self.auto_vacuum()
    }

    pub fn page_size(&self) -> Result<i64> {
        self.pragma_int("page_size")
    }

    /// Deferred by the engine until the database is first created or
    /// VACUUMed; the adopted value reflects that.
    pub fn set_page_size(&self, size: i64) -> Result<i64> {
        self.exec_raw(&format!("PRAGMA page_size = {size}"))?;
        self.page_size()
    }

    pub fn max_page_count(&self) -> Result<i64> {
        self.pragma_int("max_page_count")
    }

    pub fn set_max_page_count(&self, count: i64) -> Result<i64> {
        // This pragma reports the adopted limit directly.
        self.pragma_int(&format!("max_page_count = {count}"))
    }

    /// Current size of the database in pages.
    pub fn page_count(&self) -> Result<i64> {
        self.pragma_int("page_count")
    }

    /// Number of unused pages.
    pub fn freelist_count(&self) -> Result<i64> {
        self.pragma_int("freelist_count")
    }

    /// Text encoding of the database. Read-only once the file exists.
    pub fn encoding(&self) -> Result<String> {
        self.pragma_text("encoding")
    }
}
