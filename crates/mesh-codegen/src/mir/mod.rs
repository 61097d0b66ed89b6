//! Mid-level IR: the desugared, monomorphic representation between the
//! typed CST and LLVM IR.
//!
//! By the time an expression reaches MIR, method dot-syntax is fully
//! desugared to direct calls on mangled names, string interpolation is a
//! concat chain, closures are lifted to top-level functions with explicit
//! capture lists, and pattern matches are compiled to decision trees of
//! tag switches and literal comparisons.

pub mod derive;
pub mod lower;
pub mod patterns;

use std::fmt;

// ── Module ──────────────────────────────────────────────────────────────

/// One compilation unit of MIR, consumed whole by the LLVM emitter.
#[derive(Debug, Clone, Default)]
pub struct MirModule {
    /// All functions, including lifted closures, spawn wrappers, and
    /// synthesized derive methods.
    pub functions: Vec<MirFunction>,
    pub structs: Vec<MirStructDef>,
    pub sum_types: Vec<MirSumTypeDef>,
    /// Mangled name of the entry function when this is the entry module.
    pub entry_function: Option<String>,
}

impl MirModule {
    pub fn struct_def(&self, name: &str) -> Option<&MirStructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn sum_type_def(&self, name: &str) -> Option<&MirSumTypeDef> {
        self.sum_types.iter().find(|s| s.name == name)
    }
}

// ── Functions ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MirFunction {
    /// Mangled symbol name.
    pub name: String,
    pub params: Vec<(String, MirType)>,
    pub return_type: MirType,
    pub body: MirExpr,
    /// Lifted closure bodies take the environment as an extra first
    /// parameter.
    pub is_closure_fn: bool,
    /// Captured variables, in environment slot order.
    pub captures: Vec<(String, MirType)>,
}

// ── Types ───────────────────────────────────────────────────────────────

/// A concrete MIR type; no inference variables survive lowering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MirType {
    Int,
    Float,
    Bool,
    String,
    /// Opaque pointer (heap objects, closure envs).
    Ptr,
    Unit,
    Tuple(Vec<MirType>),
    /// Known function pointer.
    FnPtr(Vec<MirType>, Box<MirType>),
    /// Named struct or sum type; the module's def tables disambiguate.
    Struct(String),
}

impl fmt::Display for MirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirType::Int => write!(f, "Int"),
            MirType::Float => write!(f, "Float"),
            MirType::Bool => write!(f, "Bool"),
            MirType::String => write!(f, "String"),
            MirType::Ptr => write!(f, "Ptr"),
            MirType::Unit => write!(f, "Unit"),
            MirType::Tuple(items) => {
                write!(f, "(")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            MirType::FnPtr(params, ret) => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
            MirType::Struct(name) => write!(f, "{name}"),
        }
    }
}

// ── Expressions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum MirLiteral {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
    /// Bitwise xor; used by synthesized FNV-1a hash bodies.
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Which runtime iteration protocol a `for` loop drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForKind {
    Range,
    List,
    Map,
    Set,
}

#[derive(Debug, Clone)]
pub enum MirExpr {
    Lit(MirLiteral, MirType),
    Var(String, MirType),
    /// A reference to a known function as a value.
    FnRef(String, MirType),
    BinOp {
        op: BinOp,
        lhs: Box<MirExpr>,
        rhs: Box<MirExpr>,
        ty: MirType,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<MirExpr>,
        ty: MirType,
    },
    /// Direct call; the callee is almost always `Var`/`FnRef` of a
    /// mangled or runtime symbol.
    Call {
        func: Box<MirExpr>,
        args: Vec<MirExpr>,
        ty: MirType,
    },
    /// Call through a `{fn_ptr, env}` closure value; the env pointer is
    /// passed as an extra first argument (null for bare functions).
    ClosureCall {
        closure: Box<MirExpr>,
        args: Vec<MirExpr>,
        ty: MirType,
    },
    If {
        cond: Box<MirExpr>,
        then_body: Box<MirExpr>,
        else_body: Box<MirExpr>,
        ty: MirType,
    },
    /// A binding statement; meaningful only inside `Block`.
    Let {
        name: String,
        ty: MirType,
        value: Box<MirExpr>,
    },
    /// Sequence; the last expression is the value.
    Block(Vec<MirExpr>, MirType),
    /// Tag dispatch over a sum value, produced by pattern compilation.
    Switch {
        scrutinee: Box<MirExpr>,
        cases: Vec<(i64, MirExpr)>,
        default: Option<Box<MirExpr>>,
        ty: MirType,
    },
    StructLit {
        name: String,
        fields: Vec<MirExpr>,
        ty: MirType,
    },
    /// Struct field load by slot index.
    FieldAccess {
        object: Box<MirExpr>,
        index: usize,
        ty: MirType,
    },
    ConstructVariant {
        type_name: String,
        variant: String,
        tag: i64,
        fields: Vec<MirExpr>,
        ty: MirType,
    },
    /// Load the tag slot of a sum value.
    GetTag {
        object: Box<MirExpr>,
    },
    /// Load field `index` of a sum value's payload.
    VariantField {
        object: Box<MirExpr>,
        index: usize,
        ty: MirType,
    },
    Tuple {
        items: Vec<MirExpr>,
        ty: MirType,
    },
    /// `tuple_nth`: load element `index` of a tuple value.
    TupleField {
        object: Box<MirExpr>,
        index: usize,
        ty: MirType,
    },
    ListLit {
        items: Vec<MirExpr>,
        ty: MirType,
    },
    /// `for x in iterable (when filter)? do body end`. With a filter this
    /// emits the five-block CFG, without it the standard four-block form.
    ForIn {
        binding: String,
        binding_ty: MirType,
        kind: ForKind,
        iterable: Box<MirExpr>,
        filter: Option<Box<MirExpr>>,
        body: Box<MirExpr>,
    },
    MakeClosure {
        fn_name: String,
        captures: Vec<MirExpr>,
        ty: MirType,
    },
    ActorSpawn {
        /// Spawn wrapper symbol; takes the packed argument tuple.
        wrapper: String,
        args: Vec<MirExpr>,
        ty: MirType,
    },
    ActorSend {
        target: Box<MirExpr>,
        message: Box<MirExpr>,
    },
    ActorReceive {
        /// Compiled dispatch over the received value, with the value
        /// bound to `binding` around `dispatch`.
        binding: String,
        dispatch: Box<MirExpr>,
        /// Timeout in milliseconds and its body.
        timeout: Option<(Box<MirExpr>, Box<MirExpr>)>,
        ty: MirType,
    },
    Return(Box<MirExpr>),
    Panic {
        message: String,
    },
    Unit,
}

impl MirExpr {
    pub fn ty(&self) -> MirType {
        match self {
            MirExpr::Lit(_, ty)
            | MirExpr::Var(_, ty)
            | MirExpr::FnRef(_, ty)
            | MirExpr::BinOp { ty, .. }
            | MirExpr::UnaryOp { ty, .. }
            | MirExpr::Call { ty, .. }
            | MirExpr::ClosureCall { ty, .. }
            | MirExpr::If { ty, .. }
            | MirExpr::Block(_, ty)
            | MirExpr::Switch { ty, .. }
            | MirExpr::StructLit { ty, .. }
            | MirExpr::FieldAccess { ty, .. }
            | MirExpr::ConstructVariant { ty, .. }
            | MirExpr::VariantField { ty, .. }
            | MirExpr::Tuple { ty, .. }
            | MirExpr::TupleField { ty, .. }
            | MirExpr::ListLit { ty, .. }
            | MirExpr::MakeClosure { ty, .. }
            | MirExpr::ActorSpawn { ty, .. }
            | MirExpr::ActorReceive { ty, .. } => ty.clone(),
            MirExpr::GetTag { .. } => MirType::Int,
            MirExpr::Let { .. }
            | MirExpr::ActorSend { .. }
            | MirExpr::ForIn { .. }
            | MirExpr::Unit => MirType::Unit,
            MirExpr::Return(_) | MirExpr::Panic { .. } => MirType::Unit,
        }
    }
}

// ── Type definitions ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MirStructDef {
    pub name: String,
    pub fields: Vec<(String, MirType)>,
}

impl MirStructDef {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }
}

#[derive(Debug, Clone)]
pub struct MirVariantDef {
    pub name: String,
    pub fields: Vec<MirType>,
    /// Sequential tag values: 0, 1, 2, ...
    pub tag: u8,
}

#[derive(Debug, Clone)]
pub struct MirSumTypeDef {
    pub name: String,
    pub variants: Vec<MirVariantDef>,
}

impl MirSumTypeDef {
    pub fn variant(&self, name: &str) -> Option<&MirVariantDef> {
        self.variants.iter().find(|v| v.name == name)
    }
}
