//! User-defined SQL functions.
//!
//! Scalar functions are plain closures over a slice of argument [`Value`]s.
//! Aggregates are three closures: `init` produces the zero accumulator,
//! `step` folds one row into it and `final` renders the result. The
//! accumulator is allocated lazily on the first step; with zero rows scanned
//! the slot stays unset and the aggregate yields SQL NULL.
//!
//! The engine owns each registration once installed: the host callbacks live
//! in a heap context whose only release path is the engine-invoked
//! destructor, at re-registration, removal or connection close.

use std::ffi::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};

use selenite_sys::{ffi, SQLITE_TRANSIENT};

use crate::connection::Connection;
use crate::value::{FromValue, IntoValue};
use crate::{Error, Result, Value};

bitflags::bitflags! {
    /// Registration flags for user-defined functions.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FunctionFlags: c_int {
        const UTF8 = ffi::SQLITE_UTF8;
        /// Same inputs always give the same result within one statement.
        const DETERMINISTIC = ffi::SQLITE_DETERMINISTIC;
        /// Not invocable from triggers, views or schema structures.
        const DIRECT_ONLY = ffi::SQLITE_DIRECTONLY;
        /// Unlikely to cause problems even if misused.
        const INNOCUOUS = ffi::SQLITE_INNOCUOUS;
    }
}

impl Default for FunctionFlags {
    fn default() -> FunctionFlags {
        FunctionFlags::UTF8
    }
}

struct ScalarCtx {
    f: Box<dyn Fn(&[Value]) -> Result<Value> + Send>,
}

struct AggregateCtx {
    init: Box<dyn Fn() -> Value + Send>,
    step: Box<dyn Fn(Value, &[Value]) -> Result<Value> + Send>,
    finalize: Box<dyn Fn(Value) -> Result<Value> + Send>,
}

impl Connection {
    /// Register a scalar SQL function. `n_args` of -1 makes it variadic.
    ///
    /// The callback runs on whichever thread is stepping the connection and
    /// must not run SQL on this connection.
    pub fn create_scalar_function<F>(&self, name: &str, n_args: i32, f: F) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Value> + Send + 'static,
    {
        self.create_scalar_function_with_flags(name, n_args, FunctionFlags::default(), f)
    }

    pub fn create_scalar_function_with_flags<F>(
        &self,
        name: &str,
        n_args: i32,
        flags: FunctionFlags,
        f: F,
    ) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Value> + Send + 'static,
    {
        self.ensure_open()?;
        let c_name = crate::str_to_cstring(name)?;
        let ctx = Box::into_raw(Box::new(ScalarCtx { f: Box::new(f) }));
        // The engine invokes the destructor even when registration fails, so
        // the context cannot leak here.
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                self.raw(),
                c_name.as_ptr(),
                n_args,
                flags.bits(),
                ctx.cast::<c_void>(),
                Some(call_scalar),
                None,
                None,
                Some(free_boxed_ctx::<ScalarCtx>),
            )
        };
        self.decode_result(rc)
    }

    /// Register an aggregate SQL function from `init`, `step` and `final`
    /// callbacks. `n_args` of -1 makes it variadic.
    pub fn create_aggregate_function<I, S, F>(
        &self,
        name: &str,
        n_args: i32,
        init: I,
        step: S,
        finalize: F,
    ) -> Result<()>
    where
        I: Fn() -> Value + Send + 'static,
        S: Fn(Value, &[Value]) -> Result<Value> + Send + 'static,
        F: Fn(Value) -> Result<Value> + Send + 'static,
    {
        self.ensure_open()?;
        let c_name = crate::str_to_cstring(name)?;
        let ctx = Box::into_raw(Box::new(AggregateCtx {
            init: Box::new(init),
            step: Box::new(step),
            finalize: Box::new(finalize),
        }));
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                self.raw(),
                c_name.as_ptr(),
                n_args,
                FunctionFlags::default().bits(),
                ctx.cast::<c_void>(),
                None,
                Some(call_aggregate_step),
                Some(call_aggregate_final),
                Some(free_boxed_ctx::<AggregateCtx>),
            )
        };
        self.decode_result(rc)
    }

    /// Register a one-argument scalar function over typed values. An
    /// argument that fails conversion makes the function return SQL NULL.
    pub fn create_function_1<A, R, F>(&self, name: &str, f: F) -> Result<()>
    where
        A: FromValue,
        R: IntoValue,
        F: Fn(A) -> R + Send + 'static,
    {
        self.create_scalar_function(name, 1, move |args| {
            let a = match A::from_value(&args[0]) {
                Ok(a) => a,
                Err(_) => return Ok(Value::Null),
            };
            f(a).into_value()
        })
    }

    pub fn create_function_2<A, B, R, F>(&self, name: &str, f: F) -> Result<()>
    where
        A: FromValue,
        B: FromValue,
        R: IntoValue,
        F: Fn(A, B) -> R + Send + 'static,
    {
        self.create_scalar_function(name, 2, move |args| {
            let (a, b) = match (A::from_value(&args[0]), B::from_value(&args[1])) {
                (Ok(a), Ok(b)) => (a, b),
                _ => return Ok(Value::Null),
            };
            f(a, b).into_value()
        })
    }

    pub fn create_function_3<A, B, C, R, F>(&self, name: &str, f: F) -> Result<()>
    where
        A: FromValue,
        B: FromValue,
        C: FromValue,
        R: IntoValue,
        F: Fn(A, B, C) -> R + Send + 'static,
    {
        self.create_scalar_function(name, 3, move |args| {
            let converted = (
                A::from_value(&args[0]),
                B::from_value(&args[1]),
                C::from_value(&args[2]),
            );
            let (a, b, c) = match converted {
                (Ok(a), Ok(b), Ok(c)) => (a, b, c),
                _ => return Ok(Value::Null),
            };
            f(a, b, c).into_value()
        })
    }

    /// Replace a registered function with a no-op, releasing its callbacks.
    /// `name` and `n_args` must match the registration.
    pub fn remove_function(&self, name: &str, n_args: i32) -> Result<()> {
        self.ensure_open()?;
        let c_name = crate::str_to_cstring(name)?;
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                self.raw(),
                c_name.as_ptr(),
                n_args,
                ffi::SQLITE_UTF8,
                std::ptr::null_mut(),
                None,
                None,
                None,
                None,
            )
        };
        self.decode_result(rc)
    }
}

unsafe extern "C" fn free_boxed_ctx<T>(p: *mut c_void) {
    if !p.is_null() {
        drop(Box::from_raw(p.cast::<T>()));
    }
}

/// Marshal a [`Value`] into the engine's result slot. Byte payloads go
/// through the transient pathway so the engine copies them.
pub(crate) unsafe fn set_result(ctx: *mut ffi::sqlite3_context, value: &Value) {
    match value {
        Value::Null => ffi::sqlite3_result_null(ctx),
        Value::Integer(i) => ffi::sqlite3_result_int64(ctx, *i),
        Value::Real(r) => ffi::sqlite3_result_double(ctx, *r),
        Value::Text(s) => {
            if s.len() > c_int::MAX as usize {
                ffi::sqlite3_result_error_toobig(ctx);
                return;
            }
            ffi::sqlite3_result_text(
                ctx,
                s.as_ptr() as *const c_char,
                s.len() as c_int,
                SQLITE_TRANSIENT(),
            );
        }
        Value::Blob(b) => {
            if b.is_empty() {
                ffi::sqlite3_result_zeroblob(ctx, 0);
                return;
            }
            if b.len() > c_int::MAX as usize {
                ffi::sqlite3_result_error_toobig(ctx);
                return;
            }
            ffi::sqlite3_result_blob(
                ctx,
                b.as_ptr().cast::<c_void>(),
                b.len() as c_int,
                SQLITE_TRANSIENT(),
            );
        }
    }
}

/// Set the per-call error slot so the statement fails with this message.
unsafe fn report_error(ctx: *mut ffi::sqlite3_context, err: &Error) {
    if let Error::SqliteFailure(code, _) = err {
        ffi::sqlite3_result_error_code(ctx, *code);
    }
    let msg = err.to_string();
    ffi::sqlite3_result_error(ctx, msg.as_ptr() as *const c_char, msg.len() as c_int);
}

unsafe fn read_args(argc: c_int, argv: *mut *mut ffi::sqlite3_value) -> Vec<Value> {
    if argc == 0 || argv.is_null() {
        return Vec::new();
    }
    let args = std::slice::from_raw_parts(argv, argc as usize);
    args.iter()
        .map(|&raw_value| selenite_sys::Value { raw_value }.into())
        .collect()
}

unsafe extern "C" fn call_scalar(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    let args = read_args(argc, argv);
    let r = catch_unwind(AssertUnwindSafe(|| {
        let scalar = &*ffi::sqlite3_user_data(ctx).cast::<ScalarCtx>();
        (scalar.f)(&args)
    }));
    match r {
        Ok(Ok(value)) => set_result(ctx, &value),
        Ok(Err(err)) => report_error(ctx, &err),
        Err(_) => report_error(
            ctx,
            &Error::Misuse("panic in user-defined function".to_string()),
        ),
    }
}

unsafe extern "C" fn call_aggregate_step(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    // Room for one host pointer, zero-initialized by the engine per
    // aggregation.
    let pac = ffi::sqlite3_aggregate_context(ctx, std::mem::size_of::<*mut Value>() as c_int)
        .cast::<*mut Value>();
    if pac.is_null() {
        ffi::sqlite3_result_error_nomem(ctx);
        return;
    }

    let args = read_args(argc, argv);
    let r = catch_unwind(AssertUnwindSafe(|| {
        let aggr = &*ffi::sqlite3_user_data(ctx).cast::<AggregateCtx>();
        if (*pac).is_null() {
            *pac = Box::into_raw(Box::new((aggr.init)()));
        }
        // Take the accumulator out of the slot so it is released on every
        // exit path.
        let acc = Box::from_raw(*pac);
        *pac = std::ptr::null_mut();
        match (aggr.step)(*acc, &args) {
            Ok(next) => {
                *pac = Box::into_raw(Box::new(next));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }));
    match r {
        Ok(Ok(())) => {}
        Ok(Err(err)) => report_error(ctx, &err),
        Err(_) => report_error(
            ctx,
            &Error::Misuse("panic in aggregate step callback".to_string()),
        ),
    }
}

unsafe extern "C" fn call_aggregate_final(ctx: *mut ffi::sqlite3_context) {
    // N=0: no allocation when no step ever ran.
    let pac = ffi::sqlite3_aggregate_context(ctx, 0).cast::<*mut Value>();
    let acc = if pac.is_null() || (*pac).is_null() {
        None
    } else {
        let acc = Box::from_raw(*pac);
        *pac = std::ptr::null_mut();
        Some(*acc)
    };

    match acc {
        // Zero rows scanned: the slot was never set and the result is NULL.
        None => ffi::sqlite3_result_null(ctx),
        Some(acc) => {
            let r = catch_unwind(AssertUnwindSafe(|| {
                let aggr = &*ffi::sqlite3_user_data(ctx).cast::<AggregateCtx>();
                (aggr.finalize)(acc)
            }));
            match r {
                Ok(Ok(value)) => set_result(ctx, &value),
                Ok(Err(err)) => report_error(ctx, &err),
                Err(_) => report_error(
                    ctx,
                    &Error::Misuse("panic in aggregate final callback".to_string()),
                ),
            }
        }
    }
}
