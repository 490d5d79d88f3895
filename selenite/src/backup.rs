//! Online backup of one database into another.
//!
//! A [`Backup`] copies pages from a source connection's database into a
//! destination connection, in chunks sized by the caller, while the source
//! stays usable between steps. Busy and locked step errors are retryable;
//! the bridge surfaces them and leaves retry policy to the caller, except in
//! [`run_to_completion`](Backup::run_to_completion) which sleeps and retries.

use std::ffi::c_int;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use selenite_sys::ffi;

use crate::connection::{ConnInner, Connection, DatabaseName};
use crate::{Error, Result};

/// Progress of a backup as of the last step.
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    /// Source pages still to be copied.
    pub remaining: c_int,
    /// Total pages in the source database.
    pub pagecount: c_int,
}

/// Handle to an in-flight online backup. Finish is idempotent and also runs
/// on drop.
pub struct Backup {
    // The engine-side backup object references both databases.
    _src: Arc<ConnInner>,
    dest: Arc<ConnInner>,
    raw: *mut ffi::sqlite3_backup,
    finished: bool,
}

unsafe impl Send for Backup {}

impl Backup {
    /// Start backing up the `main` database of `src` into the `main`
    /// database of `dest`.
    pub fn new(src: &Connection, dest: &Connection) -> Result<Backup> {
        Backup::new_with_names(src, DatabaseName::Main, dest, DatabaseName::Main)
    }

    pub fn new_with_names(
        src: &Connection,
        src_name: DatabaseName<'_>,
        dest: &Connection,
        dest_name: DatabaseName<'_>,
    ) -> Result<Backup> {
        src.ensure_open()?;
        dest.ensure_open()?;
        let c_src_name = src_name.as_cstring()?;
        let c_dest_name = dest_name.as_cstring()?;

        let raw = unsafe {
            ffi::sqlite3_backup_init(
                dest.raw(),
                c_dest_name.as_ptr(),
                src.raw(),
                c_src_name.as_ptr(),
            )
        };
        if raw.is_null() {
            return Err(dest.error_out());
        }

        Ok(Backup {
            _src: src.inner.clone(),
            dest: dest.inner.clone(),
            raw,
            finished: false,
        })
    }

    /// Copy up to `n_pages` pages; negative copies everything remaining.
    /// Returns `true` while pages remain.
    ///
    /// Errors carry the engine code unchanged; `SQLITE_BUSY` and
    /// `SQLITE_LOCKED` are transient and may be retried after a delay.
    pub fn step(&mut self, n_pages: c_int) -> Result<bool> {
        if self.finished {
            return Err(Error::ClosedHandle("backup"));
        }
        let rc = unsafe { ffi::sqlite3_backup_step(self.raw, n_pages) };
        match rc {
            ffi::SQLITE_OK => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            _ => Err(Error::SqliteFailure(
                rc,
                crate::errors::error_from_handle(self.dest.raw),
            )),
        }
    }

    /// Source pages still to be copied. Meaningful after the first step.
    pub fn remaining(&self) -> c_int {
        if self.finished {
            return 0;
        }
        unsafe { ffi::sqlite3_backup_remaining(self.raw) }
    }

    /// Total pages in the source database. Meaningful after the first step.
    pub fn page_count(&self) -> c_int {
        if self.finished {
            return 0;
        }
        unsafe { ffi::sqlite3_backup_pagecount(self.raw) }
    }

    pub fn progress_info(&self) -> Progress {
        Progress {
            remaining: self.remaining(),
            pagecount: self.page_count(),
        }
    }

    /// Percent complete in `[0, 100]`. A backup that has not stepped yet on
    /// an empty source reports 100.
    pub fn progress(&self) -> f64 {
        let pagecount = self.page_count();
        if pagecount == 0 {
            return 100.0;
        }
        let done = pagecount - self.remaining();
        f64::from(done) / f64::from(pagecount) * 100.0
    }

    /// Release the engine-side backup state. Idempotent.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let rc = unsafe { ffi::sqlite3_backup_finish(self.raw) };
        self.raw = std::ptr::null_mut();
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Error::SqliteFailure(
                rc,
                crate::errors::error_from_code(rc),
            ))
        }
    }

    /// Copy everything in one step, then finish.
    pub fn run_all(&mut self) -> Result<()> {
        self.step(-1)?;
        self.finish()
    }

    /// Copy `pages_per_step` pages at a time, sleeping `pause` between
    /// chunks so the source can serve other work. Busy and locked steps are
    /// retried after the same pause.
    pub fn run_to_completion(
        &mut self,
        pages_per_step: c_int,
        pause: Duration,
        progress: Option<fn(Progress)>,
    ) -> Result<()> {
        assert!(pages_per_step > 0, "pages_per_step must be positive");
        loop {
            let r = self.step(pages_per_step);
            if let Some(progress) = progress {
                progress(self.progress_info());
            }
            match r {
                Ok(true) => thread::sleep(pause),
                Ok(false) => return self.finish(),
                Err(ref err)
                    if matches!(
                        err.sqlite_error_code(),
                        Some(ffi::SQLITE_BUSY) | Some(ffi::SQLITE_LOCKED)
                    ) =>
                {
                    thread::sleep(pause)
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Drop for Backup {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            tracing::warn!("error while finishing backup: {err}");
        }
    }
}
