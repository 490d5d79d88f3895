//! Virtual table support.
//!
//! A host registers a [`VTabModule`] on a connection and the engine drives it
//! through the module protocol: schema declaration, query planning
//! ([`VTabModule::best_index`]), cursor iteration and, for writable tables,
//! [`VTabModule::update`]. Cursor state is an opaque boxed host object; the
//! bridge owns the module for the engine and releases it from the
//! engine-invoked destructor.
//!
//! Two ready-made modules ship with the crate: [`array::ArrayTable`], a
//! mutable in-memory table, and [`generator::Generator`], a read-only lazy
//! sequence.

pub mod array;
pub mod generator;

use std::ffi::{c_char, c_int, c_void, CString};

use once_cell::sync::Lazy;

use selenite_sys::ffi;

use crate::connection::Connection;
use crate::functions::set_result;
use crate::{Error, Result, Value};

// Bindgen names for the nested index-info structs.
use selenite_sys::ffi::sqlite3_index_constraint as raw_index_constraint;
use selenite_sys::ffi::sqlite3_index_orderby as raw_index_orderby;

/// One column of a virtual table's shape.
#[derive(Clone, Debug)]
pub struct SchemaColumn {
    pub name: String,
    pub decl_type: String,
    pub hidden: bool,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, decl_type: impl Into<String>) -> SchemaColumn {
        SchemaColumn {
            name: name.into(),
            decl_type: decl_type.into(),
            hidden: false,
        }
    }

    pub fn hidden(mut self) -> SchemaColumn {
        self.hidden = true;
        self
    }
}

/// The ordered column set declared for a virtual table.
#[derive(Clone, Debug)]
pub struct TableSchema {
    pub columns: Vec<SchemaColumn>,
}

impl TableSchema {
    pub fn new(columns: Vec<SchemaColumn>) -> TableSchema {
        TableSchema { columns }
    }

    /// Assembles the `CREATE TABLE` statement handed to the engine's
    /// declare-vtab entry point. Identifiers are passed through verbatim;
    /// escaping is the caller's responsibility.
    fn declare_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| {
                let mut col = format!("{} {}", c.name, c.decl_type);
                if c.hidden {
                    col.push_str(" HIDDEN");
                }
                col
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE x({cols})")
    }
}

/// WHERE-clause constraint operator, as reported to
/// [`VTabModule::best_index`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexConstraintOp {
    Eq,
    Gt,
    Le,
    Lt,
    Ge,
    Match,
    Like,
    Glob,
    Regexp,
    Ne,
    IsNot,
    IsNotNull,
    IsNull,
    Is,
    Limit,
    Offset,
    Other(u8),
}

impl From<u8> for IndexConstraintOp {
    fn from(op: u8) -> IndexConstraintOp {
        match op {
            2 => IndexConstraintOp::Eq,
            4 => IndexConstraintOp::Gt,
            8 => IndexConstraintOp::Le,
            16 => IndexConstraintOp::Lt,
            32 => IndexConstraintOp::Ge,
            64 => IndexConstraintOp::Match,
            65 => IndexConstraintOp::Like,
            66 => IndexConstraintOp::Glob,
            67 => IndexConstraintOp::Regexp,
            68 => IndexConstraintOp::Ne,
            69 => IndexConstraintOp::IsNot,
            70 => IndexConstraintOp::IsNotNull,
            71 => IndexConstraintOp::IsNull,
            72 => IndexConstraintOp::Is,
            73 => IndexConstraintOp::Limit,
            74 => IndexConstraintOp::Offset,
            other => IndexConstraintOp::Other(other),
        }
    }
}

/// One WHERE-clause constraint on a virtual table scan. `column` is -1 for
/// the rowid.
#[derive(Clone, Copy, Debug)]
pub struct IndexConstraint {
    pub column: i32,
    pub op: IndexConstraintOp,
    pub usable: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct IndexOrderBy {
    pub column: i32,
    pub desc: bool,
}

/// Planner input for [`VTabModule::best_index`].
#[derive(Clone, Debug)]
pub struct IndexInfo {
    pub constraints: Vec<IndexConstraint>,
    pub order_by: Vec<IndexOrderBy>,
}

/// How the module will use one constraint.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstraintUsage {
    /// If set, the constraint's right-hand value is passed to the cursor
    /// open call at this one-based argv position.
    pub argv_index: Option<i32>,
    /// If set, the engine skips its own re-check of the constraint.
    pub omit: bool,
}

/// Planner output of [`VTabModule::best_index`], translated back onto the
/// engine's struct by the bridge.
#[derive(Clone, Debug)]
pub struct IndexOutput {
    pub constraint_usage: Vec<ConstraintUsage>,
    pub idx_num: i32,
    pub idx_str: Option<String>,
    pub order_by_consumed: bool,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
}

impl IndexOutput {
    /// The minimally-correct plan: a full scan with high cost and row count,
    /// using no constraints.
    pub fn full_scan(n_constraints: usize) -> IndexOutput {
        IndexOutput {
            constraint_usage: vec![ConstraintUsage::default(); n_constraints],
            idx_num: 0,
            idx_str: None,
            order_by_consumed: false,
            estimated_cost: 2_147_483_647.0,
            estimated_rows: 2_147_483_647,
        }
    }
}

/// A row change requested through SQL against a virtual table, decoded from
/// the engine's xUpdate argument convention.
#[derive(Clone, Debug)]
pub enum VTabChange {
    Delete(i64),
    Insert {
        /// Explicit rowid, absent when the engine lets the module assign one.
        rowid: Option<i64>,
        values: Vec<Value>,
    },
    Update {
        rowid: i64,
        new_rowid: i64,
        values: Vec<Value>,
    },
}

/// Per-query cursor of a virtual table scan. Operations arrive serialized:
/// `open` then `(column | rowid | next)*` until [`eof`](VTabCursor::eof).
pub trait VTabCursor: Send + 'static {
    fn eof(&self) -> bool;
    fn next(&mut self) -> Result<()>;
    fn column(&self, idx: usize) -> Result<Value>;
    fn rowid(&self) -> Result<i64>;
}

/// A host-defined virtual table module, registered per connection with
/// [`Connection::create_module`].
pub trait VTabModule: Send + 'static {
    /// The table shape declared to the engine.
    fn schema(&self) -> TableSchema;

    /// Query planning. The default is a full scan; modules that care fill in
    /// an argv slot per usable constraint.
    fn best_index(&self, info: &IndexInfo) -> IndexOutput {
        IndexOutput::full_scan(info.constraints.len())
    }

    /// Begin a scan. `args` carries the constraint values requested through
    /// `argv_index` in [`best_index`](VTabModule::best_index).
    fn open(&self, idx_num: i32, idx_str: Option<&str>, args: &[Value])
        -> Result<Box<dyn VTabCursor>>;

    /// Apply a row change. Modules that do not override this are read-only.
    /// An insert returns the rowid the engine should report.
    fn update(&self, change: VTabChange) -> Result<Option<i64>> {
        let _ = change;
        Err(Error::ReadOnly)
    }
}

struct ModuleCtx {
    module: Box<dyn VTabModule>,
}

#[repr(C)]
struct ModuleVTab {
    /// Base class. Must be first
    base: ffi::sqlite3_vtab,
    ctx: *const ModuleCtx,
}

#[repr(C)]
struct ModuleCursor {
    /// Base class. Must be first
    base: ffi::sqlite3_vtab_cursor,
    cursor: Option<Box<dyn VTabCursor>>,
}

// One trampoline set serves every registered module; per-module state rides
// on the aux pointer.
static MODULE_DEF: Lazy<ffi::sqlite3_module> = Lazy::new(|| {
    let mut def: ffi::sqlite3_module = unsafe { std::mem::zeroed() };
    def.iVersion = 1;
    def.xCreate = Some(x_create);
    def.xConnect = Some(x_create);
    def.xBestIndex = Some(x_best_index);
    def.xDisconnect = Some(x_disconnect);
    def.xDestroy = Some(x_disconnect);
    def.xOpen = Some(x_open);
    def.xClose = Some(x_close);
    def.xFilter = Some(x_filter);
    def.xNext = Some(x_next);
    def.xEof = Some(x_eof);
    def.xColumn = Some(x_column);
    def.xRowid = Some(x_rowid);
    def.xUpdate = Some(x_update);
    def
});

impl Connection {
    /// Register a virtual table module under `name`. The engine owns the
    /// module once installed and releases it through the registration
    /// destructor, at de-registration or connection close.
    pub fn create_module<M: VTabModule>(&self, name: &str, module: M) -> Result<()> {
        self.ensure_open()?;
        let c_name = crate::str_to_cstring(name)?;
        let ctx = Box::into_raw(Box::new(ModuleCtx {
            module: Box::new(module),
        }));
        let rc = unsafe {
            ffi::sqlite3_create_module_v2(
                self.raw(),
                c_name.as_ptr(),
                &*MODULE_DEF,
                ctx as *mut c_void,
                Some(destroy_module_ctx),
            )
        };
        self.decode_result(rc)
    }
}

unsafe extern "C" fn destroy_module_ctx(ctx: *mut c_void) {
    if !ctx.is_null() {
        drop(Box::from_raw(ctx.cast::<ModuleCtx>()));
    }
}

unsafe fn set_err_msg(vtab: *mut ffi::sqlite3_vtab, err_msg: &str) {
    if !(*vtab).zErrMsg.is_null() {
        ffi::sqlite3_free((*vtab).zErrMsg.cast::<c_void>());
    }
    (*vtab).zErrMsg = mprintf(err_msg);
}

/// Engine-allocated copy of `err_msg`, for fields the engine frees itself.
fn mprintf(err_msg: &str) -> *mut c_char {
    let c_format = CString::new("%s").unwrap();
    let c_err = CString::new(err_msg).unwrap();
    unsafe { ffi::sqlite3_mprintf(c_format.as_ptr(), c_err.as_ptr()) }
}

/// Maps a bridge error onto a vtab callback result, attaching the message to
/// the table struct where the protocol allows one.
unsafe fn vtab_error(vtab: *mut ffi::sqlite3_vtab, err: &Error) -> c_int {
    match err {
        Error::SqliteFailure(code, msg) => {
            set_err_msg(vtab, msg);
            *code
        }
        Error::ReadOnly => ffi::SQLITE_READONLY,
        other => {
            set_err_msg(vtab, &other.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

unsafe fn read_values(argc: c_int, argv: *mut *mut ffi::sqlite3_value) -> Vec<Value> {
    if argc == 0 || argv.is_null() {
        return Vec::new();
    }
    let args = std::slice::from_raw_parts(argv, argc as usize);
    args.iter()
        .map(|&raw_value| selenite_sys::Value { raw_value }.into())
        .collect()
}

unsafe extern "C" fn x_create(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    _argc: c_int,
    _argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    err_msg: *mut *mut c_char,
) -> c_int {
    let ctx = aux.cast::<ModuleCtx>();
    let sql = (*ctx).module.schema().declare_sql();
    let c_sql = match CString::new(sql) {
        Ok(c_sql) => c_sql,
        Err(_) => {
            *err_msg = mprintf("virtual table schema contains a NUL byte");
            return ffi::SQLITE_ERROR;
        }
    };
    let rc = ffi::sqlite3_declare_vtab(db, c_sql.as_ptr());
    if rc != ffi::SQLITE_OK {
        *err_msg = mprintf(&crate::errors::error_from_code(rc));
        return rc;
    }
    let vtab = Box::new(ModuleVTab {
        base: std::mem::zeroed(),
        ctx,
    });
    *pp_vtab = Box::into_raw(vtab).cast::<ffi::sqlite3_vtab>();
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_disconnect(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    if !vtab.is_null() {
        drop(Box::from_raw(vtab.cast::<ModuleVTab>()));
    }
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_best_index(
    vtab: *mut ffi::sqlite3_vtab,
    info: *mut ffi::sqlite3_index_info,
) -> c_int {
    let vt = vtab.cast::<ModuleVTab>();

    let raw_constraints: &[raw_index_constraint] =
        std::slice::from_raw_parts((*info).aConstraint, (*info).nConstraint as usize);
    let raw_order_by: &[raw_index_orderby] =
        std::slice::from_raw_parts((*info).aOrderBy, (*info).nOrderBy as usize);

    let input = IndexInfo {
        constraints: raw_constraints
            .iter()
            .map(|c| IndexConstraint {
                column: c.iColumn,
                op: IndexConstraintOp::from(c.op),
                usable: c.usable != 0,
            })
            .collect(),
        order_by: raw_order_by
            .iter()
            .map(|o| IndexOrderBy {
                column: o.iColumn,
                desc: o.desc != 0,
            })
            .collect(),
    };

    let output = (*(*vt).ctx).module.best_index(&input);

    let usages = std::slice::from_raw_parts_mut(
        (*info).aConstraintUsage,
        (*info).nConstraint as usize,
    );
    for (usage, out) in usages.iter_mut().zip(output.constraint_usage.iter()) {
        usage.argvIndex = out.argv_index.unwrap_or(0);
        usage.omit = out.omit as u8;
    }

    (*info).idxNum = output.idx_num;
    if let Some(idx_str) = output.idx_str {
        (*info).idxStr = mprintf(&idx_str);
        (*info).needToFreeIdxStr = 1;
    }
    (*info).orderByConsumed = output.order_by_consumed as c_int;
    (*info).estimatedCost = output.estimated_cost;
    (*info).estimatedRows = output.estimated_rows;

    ffi::SQLITE_OK
}

unsafe extern "C" fn x_open(
    vtab: *mut ffi::sqlite3_vtab,
    pp_cursor: *mut *mut ffi::sqlite3_vtab_cursor,
) -> c_int {
    let _ = vtab;
    // The host cursor is created lazily at filter time; xOpen only allocates
    // the engine-facing wrapper.
    let cursor = Box::new(ModuleCursor {
        base: std::mem::zeroed(),
        cursor: None,
    });
    *pp_cursor = Box::into_raw(cursor).cast::<ffi::sqlite3_vtab_cursor>();
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_close(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    if !cursor.is_null() {
        drop(Box::from_raw(cursor.cast::<ModuleCursor>()));
    }
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_filter(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    idx_num: c_int,
    idx_str: *const c_char,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) -> c_int {
    let cr = cursor.cast::<ModuleCursor>();
    let vtab = (*cr).base.pVtab;
    let vt = vtab.cast::<ModuleVTab>();

    let idx_str = if idx_str.is_null() {
        None
    } else {
        std::ffi::CStr::from_ptr(idx_str).to_str().ok()
    };
    let args = read_values(argc, argv);

    match (*(*vt).ctx).module.open(idx_num, idx_str, &args) {
        Ok(host_cursor) => {
            (*cr).cursor = Some(host_cursor);
            ffi::SQLITE_OK
        }
        Err(err) => {
            (*cr).cursor = None;
            vtab_error(vtab, &err)
        }
    }
}

unsafe extern "C" fn x_next(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let cr = cursor.cast::<ModuleCursor>();
    match (*cr).cursor.as_mut() {
        Some(host_cursor) => match host_cursor.next() {
            Ok(()) => ffi::SQLITE_OK,
            Err(err) => vtab_error((*cr).base.pVtab, &err),
        },
        None => ffi::SQLITE_MISUSE,
    }
}

unsafe extern "C" fn x_eof(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let cr = cursor.cast::<ModuleCursor>();
    match (*cr).cursor.as_ref() {
        Some(host_cursor) => host_cursor.eof() as c_int,
        None => 1,
    }
}

unsafe extern "C" fn x_column(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    ctx: *mut ffi::sqlite3_context,
    col: c_int,
) -> c_int {
    let cr = cursor.cast::<ModuleCursor>();
    match (*cr).cursor.as_ref() {
        Some(host_cursor) => match host_cursor.column(col as usize) {
            Ok(value) => {
                set_result(ctx, &value);
                ffi::SQLITE_OK
            }
            Err(err) => vtab_error((*cr).base.pVtab, &err),
        },
        None => ffi::SQLITE_MISUSE,
    }
}

unsafe extern "C" fn x_rowid(cursor: *mut ffi::sqlite3_vtab_cursor, p_rowid: *mut i64) -> c_int {
    let cr = cursor.cast::<ModuleCursor>();
    match (*cr).cursor.as_ref() {
        Some(host_cursor) => match host_cursor.rowid() {
            Ok(rowid) => {
                *p_rowid = rowid;
                ffi::SQLITE_OK
            }
            Err(err) => vtab_error((*cr).base.pVtab, &err),
        },
        None => ffi::SQLITE_MISUSE,
    }
}

unsafe extern "C" fn x_update(
    vtab: *mut ffi::sqlite3_vtab,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
    p_rowid: *mut i64,
) -> c_int {
    let vt = vtab.cast::<ModuleVTab>();
    let args = read_values(argc, argv);

    // xUpdate argument convention: one argument is a DELETE; a NULL first
    // argument is an INSERT; anything else is an UPDATE.
    let change = if args.len() == 1 {
        match args[0].as_integer() {
            Some(rowid) => VTabChange::Delete(*rowid),
            None => {
                set_err_msg(vtab, "DELETE rowid is not an integer");
                return ffi::SQLITE_ERROR;
            }
        }
    } else if args[0].is_null() {
        VTabChange::Insert {
            rowid: args[1].as_integer().copied(),
            values: args[2..].to_vec(),
        }
    } else {
        let rowid = match args[0].as_integer() {
            Some(rowid) => *rowid,
            None => {
                set_err_msg(vtab, "UPDATE rowid is not an integer");
                return ffi::SQLITE_ERROR;
            }
        };
        let new_rowid = args[1].as_integer().copied().unwrap_or(rowid);
        VTabChange::Update {
            rowid,
            new_rowid,
            values: args[2..].to_vec(),
        }
    };

    let is_insert = matches!(change, VTabChange::Insert { .. });
    match (*(*vt).ctx).module.update(change) {
        Ok(new_rowid) => {
            if is_insert {
                if let Some(rowid) = new_rowid {
                    *p_rowid = rowid;
                }
            }
            ffi::SQLITE_OK
        }
        Err(err) => vtab_error(vtab, &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_sql_assembly() {
        let schema = TableSchema::new(vec![
            SchemaColumn::new("id", "INTEGER"),
            SchemaColumn::new("name", "TEXT"),
            SchemaColumn::new("aux", "BLOB").hidden(),
        ]);
        assert_eq!(
            schema.declare_sql(),
            "CREATE TABLE x(id INTEGER, name TEXT, aux BLOB HIDDEN)"
        );
    }

    #[test]
    fn full_scan_output_covers_constraints() {
        let out = IndexOutput::full_scan(3);
        assert_eq!(out.constraint_usage.len(), 3);
        assert!(out.constraint_usage.iter().all(|u| u.argv_index.is_none()));
        assert_eq!(out.idx_num, 0);
    }

    #[test]
    fn constraint_op_mapping() {
        assert_eq!(IndexConstraintOp::from(2), IndexConstraintOp::Eq);
        assert_eq!(IndexConstraintOp::from(32), IndexConstraintOp::Ge);
        assert_eq!(IndexConstraintOp::from(200), IndexConstraintOp::Other(200));
    }
}
