//! CST + typeck results -> MIR.
//!
//! Everything surface-level is desugared here: dot-syntax and bare-name
//! trait calls funnel through one dispatch helper so they produce
//! identical MIR; interpolation becomes a `mesh_string_concat` chain;
//! closures are lifted with explicit captures; `spawn` targets get
//! tuple-unpacking wrapper functions.

use crate::builtins::{builtin_method_symbol, map_builtin_name, stdlib_module_symbol};
use crate::mir::{
    BinOp, ForKind, MirExpr, MirFunction, MirLiteral, MirModule, MirStructDef, MirSumTypeDef,
    MirType, MirVariantDef, UnaryOp,
};
use mesh_parser::SyntaxKind;
use mesh_parser::ast::{self, AstNode, Expr, Item, Stmt};
use mesh_typeck::TypeckResult;
use mesh_typeck::traits::mangle_trait_method;
use mesh_typeck::ty::Ty;
use rustc_hash::FxHashMap;

/// Driver-supplied context for lowering one module.
#[derive(Debug, Default)]
pub struct LowerOptions {
    /// Dotted module name (`Math.Vector`).
    pub module_name: String,
    pub is_entry: bool,
    /// `from M import f`: local name -> defining module's symbol.
    pub extern_fns: FxHashMap<String, String>,
    /// `import M`: namespace alias -> (fn name -> symbol).
    pub qualified_fns: FxHashMap<String, FxHashMap<String, String>>,
}

/// Mangle a module-level function into its global symbol.
pub fn mangle_module_fn(module_name: &str, fn_name: &str) -> String {
    format!("{}__{}", module_name.replace('.', "_"), fn_name)
}

/// Lower one type-checked module.
pub fn lower(parse: &mesh_parser::Parse, typeck: &TypeckResult, opts: &LowerOptions) -> MirModule {
    let mut lowerer = Lowerer::new(typeck, opts);
    lowerer.run(&parse.tree());
    lowerer.module
}

pub(crate) struct Lowerer<'a> {
    pub(crate) typeck: &'a TypeckResult,
    pub(crate) opts: &'a LowerOptions,
    pub(crate) module: MirModule,
    /// Local variable types, innermost scope last.
    scopes: Vec<FxHashMap<String, MirType>>,
    /// Names of functions defined in this module (unmangled).
    local_fns: FxHashMap<String, String>,
    lifted: Vec<MirFunction>,
    lambda_counter: usize,
    temp_counter: usize,
    /// Spawn targets already wrapped: symbol -> wrapper symbol.
    spawn_wrappers: FxHashMap<String, String>,
}

impl<'a> Lowerer<'a> {
    fn new(typeck: &'a TypeckResult, opts: &'a LowerOptions) -> Self {
        Lowerer {
            typeck,
            opts,
            module: MirModule::default(),
            scopes: vec![FxHashMap::default()],
            local_fns: FxHashMap::default(),
            lifted: Vec::new(),
            lambda_counter: 0,
            temp_counter: 0,
            spawn_wrappers: FxHashMap::default(),
        }
    }

    fn run(&mut self, tree: &ast::SourceFile) {
        self.collect_type_defs();

        // Register local function symbols first so forward calls resolve.
        for item in tree.items() {
            if let Item::FnDef(f) = &item {
                if let Some(name) = f.name().map(|n| n.text()) {
                    let symbol = mangle_module_fn(&self.opts.module_name, &name);
                    self.local_fns.insert(name, symbol);
                }
            }
        }

        for item in tree.items() {
            match &item {
                Item::FnDef(f) => self.lower_fn_def(f, None),
                Item::ImplDef(impl_def) => self.lower_impl(impl_def),
                _ => {}
            }
        }

        // Auto-derive synthesis for every derived trait on every type.
        let derived = crate::mir::derive::synthesize(
            &self.module.structs,
            &self.module.sum_types,
            &self.typeck.type_registry,
        );
        self.module.functions.extend(derived);

        let lifted = std::mem::take(&mut self.lifted);
        self.module.functions.extend(lifted);

        if self.opts.is_entry {
            self.module.entry_function = self
                .local_fns
                .get("main")
                .cloned();
        }
    }

    fn collect_type_defs(&mut self) {
        let registry = &self.typeck.type_registry;
        for def in registry.struct_defs.values() {
            let fields = def
                .fields
                .iter()
                .map(|(n, ty)| (n.clone(), self.ty_to_mir(ty)))
                .collect();
            self.module.structs.push(MirStructDef {
                name: def.name.clone(),
                fields,
            });
        }
        for def in registry.sum_type_defs.values() {
            let variants = def
                .variants
                .iter()
                .map(|v| MirVariantDef {
                    name: v.name.clone(),
                    fields: v.fields.iter().map(|t| self.ty_to_mir(t)).collect(),
                    tag: v.tag,
                })
                .collect();
            self.module.sum_types.push(MirSumTypeDef {
                name: def.name.clone(),
                variants,
            });
        }
    }

    // ── Types ───────────────────────────────────────────────────────────

    pub(crate) fn ty_to_mir(&self, ty: &Ty) -> MirType {
        match ty {
            Ty::Con(name) => match name.as_str() {
                "Int" | "Pid" => MirType::Int,
                "Float" => MirType::Float,
                "Bool" => MirType::Bool,
                "String" => MirType::String,
                "Unit" => MirType::Unit,
                "Range" => MirType::Tuple(vec![MirType::Int, MirType::Int]),
                "Ordering" => MirType::Int,
                other => MirType::Struct(other.to_string()),
            },
            // Element types are erased at the MIR level; collections are
            // opaque pointers into the runtime heap.
            Ty::App(name, _) => match name.as_str() {
                "List" | "Map" | "Set" | "Iter" => MirType::Ptr,
                "Option" | "Result" => MirType::Struct(name.clone()),
                other => MirType::Struct(other.to_string()),
            },
            Ty::Fun(..) => MirType::Ptr,
            Ty::Tuple(items) if items.is_empty() => MirType::Unit,
            Ty::Tuple(items) => {
                MirType::Tuple(items.iter().map(|t| self.ty_to_mir(t)).collect())
            }
            // Unconstrained values live in one opaque 8-byte slot.
            Ty::Var(_) => MirType::Int,
        }
    }

    pub(crate) fn ty_of_node(&self, node: &mesh_parser::SyntaxNode) -> Option<Ty> {
        self.typeck.types.get(&node.text_range()).cloned()
    }

    fn mir_ty_of(&self, node: &mesh_parser::SyntaxNode) -> MirType {
        self.ty_of_node(node)
            .map(|t| self.ty_to_mir(&t))
            .unwrap_or(MirType::Int)
    }

    /// Sum types whose variants are all nullary are unboxed to a bare
    /// tag integer.
    pub(crate) fn is_unboxed_sum(&self, name: &str) -> bool {
        match name {
            "Ordering" => true,
            "Option" | "Result" => false,
            _ => self
                .module
                .sum_type_def(name)
                .map(|d| d.variants.iter().all(|v| v.fields.is_empty()))
                .unwrap_or(false),
        }
    }

    // ── Scopes ──────────────────────────────────────────────────────────

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn bind(&mut self, name: &str, ty: MirType) {
        self.scopes
            .last_mut()
            .expect("scope stack never empty")
            .insert(name.to_string(), ty);
    }

    fn local_ty(&self, name: &str) -> Option<MirType> {
        self.scopes.iter().rev().find_map(|s| s.get(name)).cloned()
    }

    pub(crate) fn fresh_temp(&mut self, prefix: &str) -> String {
        self.temp_counter += 1;
        format!("__{prefix}{}", self.temp_counter)
    }

    // ── Items ───────────────────────────────────────────────────────────

    fn lower_fn_def(&mut self, f: &ast::FnDef, override_symbol: Option<String>) {
        let Some(name) = f.name().map(|n| n.text()) else {
            return;
        };
        let symbol = override_symbol
            .or_else(|| self.local_fns.get(&name).cloned())
            .unwrap_or_else(|| mangle_module_fn(&self.opts.module_name, &name));

        // Parameter and return types from the checker.
        let fn_ty = self
            .typeck
            .fn_schemes
            .get(&name)
            .map(|s| s.ty.clone())
            .or_else(|| self.ty_of_node(f.syntax()));
        let (param_tys, ret_ty) = match fn_ty {
            Some(Ty::Fun(params, ret)) => (
                params.iter().map(|t| self.ty_to_mir(t)).collect::<Vec<_>>(),
                self.ty_to_mir(&ret),
            ),
            _ => (Vec::new(), MirType::Unit),
        };

        self.push_scope();
        let mut params = Vec::new();
        if let Some(pl) = f.param_list() {
            for (i, p) in pl.params().enumerate() {
                let pname = if p.is_self() {
                    "self".to_string()
                } else {
                    p.name().map(|n| n.text()).unwrap_or_else(|| format!("__p{i}"))
                };
                let pty = param_tys.get(i).cloned().unwrap_or(MirType::Int);
                self.bind(&pname, pty.clone());
                params.push((pname, pty));
            }
        }
        let body = match f.body() {
            Some(b) => self.lower_block(&b),
            None => MirExpr::Unit,
        };
        self.pop_scope();

        self.module.functions.push(MirFunction {
            name: symbol,
            params,
            return_type: ret_ty,
            body,
            is_closure_fn: false,
            captures: Vec::new(),
        });
    }

    fn lower_impl(&mut self, impl_def: &ast::ImplDef) {
        let Some(trait_name) = impl_def.trait_path().map(|p| p.dotted()) else {
            return;
        };
        let Some(type_name) = impl_def.type_path().map(|p| p.dotted()) else {
            return;
        };
        let impl_ty = Ty::Con(type_name.clone());
        for m in impl_def.methods() {
            let Some(mname) = m.name().map(|n| n.text()) else {
                continue;
            };
            let symbol = mangle_trait_method(&trait_name, &mname, &impl_ty);
            self.lower_impl_method(&m, symbol, &type_name);
        }
    }

    fn lower_impl_method(&mut self, f: &ast::FnDef, symbol: String, type_name: &str) {
        let self_ty = MirType::Struct(type_name.to_string());
        self.push_scope();
        let mut params = Vec::new();
        if let Some(pl) = f.param_list() {
            for (i, p) in pl.params().enumerate() {
                if p.is_self() {
                    self.bind("self", self_ty.clone());
                    params.push(("self".to_string(), self_ty.clone()));
                } else {
                    let pname = p.name().map(|n| n.text()).unwrap_or_else(|| format!("__p{i}"));
                    let pty = p
                        .syntax()
                        .children()
                        .find_map(|c| self.ty_of_node(&c))
                        .map(|t| self.ty_to_mir(&t))
                        .unwrap_or(MirType::Int);
                    self.bind(&pname, pty.clone());
                    params.push((pname, pty));
                }
            }
        }
        let body = match f.body() {
            Some(b) => self.lower_block(&b),
            None => MirExpr::Unit,
        };
        let return_type = body.ty();
        self.pop_scope();

        self.module.functions.push(MirFunction {
            name: symbol,
            params,
            return_type,
            body,
            is_closure_fn: false,
            captures: Vec::new(),
        });
    }

    // ── Statements and blocks ───────────────────────────────────────────

    pub(crate) fn lower_block(&mut self, block: &ast::Block) -> MirExpr {
        self.push_scope();
        let mut stmts = Vec::new();
        for stmt in block.stmts() {
            match stmt {
                Stmt::Let(l) => {
                    let value = match l.value() {
                        Some(v) => self.lower_expr(&v),
                        None => MirExpr::Unit,
                    };
                    let ty = value.ty();
                    if let Some(name) = l.name().map(|n| n.text()) {
                        self.bind(&name, ty.clone());
                        stmts.push(MirExpr::Let {
                            name,
                            ty,
                            value: Box::new(value),
                        });
                    }
                }
                Stmt::Expr(e) => stmts.push(self.lower_expr(&e)),
            }
        }
        self.pop_scope();
        let ty = stmts.last().map(|e| e.ty()).unwrap_or(MirType::Unit);
        MirExpr::Block(stmts, ty)
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> MirExpr {
        match expr {
            Expr::Literal(lit) => match lit.kind() {
                Some(ast::LiteralKind::Int(v)) => MirExpr::Lit(MirLiteral::Int(v), MirType::Int),
                Some(ast::LiteralKind::Float(v)) => {
                    MirExpr::Lit(MirLiteral::Float(v), MirType::Float)
                }
                Some(ast::LiteralKind::Bool(v)) => {
                    MirExpr::Lit(MirLiteral::Bool(v), MirType::Bool)
                }
                None => MirExpr::Unit,
            },
            Expr::StringExpr(s) => self.lower_string(s),
            Expr::NameRef(name_ref) => self.lower_name_ref(name_ref),
            Expr::BinaryExpr(b) => self.lower_binary(b),
            Expr::UnaryExpr(u) => self.lower_unary(u),
            Expr::CallExpr(call) => self.lower_call(call),
            Expr::FieldAccess(fa) => self.lower_field_access(fa),
            Expr::ParenExpr(p) => match p.expr() {
                Some(inner) => self.lower_expr(&inner),
                None => MirExpr::Unit,
            },
            Expr::TupleExpr(t) => {
                let items: Vec<MirExpr> = t.items().map(|e| self.lower_expr(&e)).collect();
                if items.is_empty() {
                    MirExpr::Unit
                } else {
                    let ty = MirType::Tuple(items.iter().map(|i| i.ty()).collect());
                    MirExpr::Tuple { items, ty }
                }
            }
            Expr::ListExpr(l) => {
                let items: Vec<MirExpr> = l.items().map(|e| self.lower_expr(&e)).collect();
                MirExpr::ListLit {
                    items,
                    ty: MirType::Ptr,
                }
            }
            Expr::IfExpr(i) => self.lower_if(i),
            Expr::CaseExpr(c) => self.lower_case(c),
            Expr::ForExpr(f) => self.lower_for(f),
            Expr::LambdaExpr(l) => self.lower_lambda(l),
            Expr::ReceiveExpr(r) => self.lower_receive(r),
            Expr::SpawnExpr(s) => self.lower_spawn(s),
            Expr::SendExpr(s) => self.lower_send(s),
            Expr::ReturnExpr(r) => {
                let value = match r.expr() {
                    Some(e) => self.lower_expr(&e),
                    None => MirExpr::Unit,
                };
                MirExpr::Return(Box::new(value))
            }
            Expr::TryExpr(t) => self.lower_try(t),
            Expr::StructLit(s) => self.lower_struct_lit(s),
        }
    }

    /// `"a ${e1} b"` becomes a chain of `mesh_string_concat` calls, with
    /// each interpolated segment wrapped in the `to_string` dispatch
    /// appropriate to its type.
    fn lower_string(&mut self, s: &ast::StringExpr) -> MirExpr {
        let mut acc: Option<MirExpr> = None;
        for seg in s.segments() {
            let piece = match seg {
                ast::StringSegment::Content(tok) => MirExpr::Lit(
                    MirLiteral::String(ast::unescape(tok.text())),
                    MirType::String,
                ),
                ast::StringSegment::Interpolation(interp) => match interp.expr() {
                    Some(e) => {
                        let ty = self.ty_of_node(e.syntax());
                        let lowered = self.lower_expr(&e);
                        self.display_dispatch(lowered, ty.as_ref())
                    }
                    None => MirExpr::Lit(MirLiteral::String(String::new()), MirType::String),
                },
            };
            acc = Some(match acc {
                None => piece,
                Some(prev) => rt_call("mesh_string_concat", vec![prev, piece], MirType::String),
            });
        }
        acc.unwrap_or(MirExpr::Lit(MirLiteral::String(String::new()), MirType::String))
    }

    /// The shared `to_string` dispatch used by interpolation and by the
    /// synthesized Display bodies.
    pub(crate) fn display_dispatch(&mut self, value: MirExpr, ty: Option<&Ty>) -> MirExpr {
        let ty = match ty {
            Some(t) => t.clone(),
            None => return rt_call("mesh_int_to_string", vec![value], MirType::String),
        };
        match &ty {
            Ty::Con(n) if n == "String" => value,
            Ty::Con(n) if n == "Int" || n == "Pid" => {
                rt_call("mesh_int_to_string", vec![value], MirType::String)
            }
            Ty::Con(n) if n == "Float" => {
                rt_call("mesh_float_to_string", vec![value], MirType::String)
            }
            Ty::Con(n) if n == "Bool" => {
                rt_call("mesh_bool_to_string", vec![value], MirType::String)
            }
            _ => {
                // Trait dispatch on the mangled Display impl.
                let mangled = mangle_trait_method("Display", "to_string", &ty);
                MirExpr::Call {
                    func: Box::new(MirExpr::Var(
                        mangled,
                        MirType::FnPtr(vec![value.ty()], Box::new(MirType::String)),
                    )),
                    args: vec![value],
                    ty: MirType::String,
                }
            }
        }
    }

    fn lower_name_ref(&mut self, name_ref: &ast::NameRef) -> MirExpr {
        let name = name_ref.text();
        let mir_ty = self.mir_ty_of(name_ref.syntax());
        if let Some(ty) = self.local_ty(&name) {
            return MirExpr::Var(name, ty);
        }
        // Nullary variant constructors in value position.
        if let Some(ctor) = self.nullary_variant(&name) {
            return ctor;
        }
        // Function referenced as a value: a bare closure with a null env.
        if let Some(symbol) = self
            .local_fns
            .get(&name)
            .or_else(|| self.opts.extern_fns.get(&name))
            .cloned()
        {
            return MirExpr::MakeClosure {
                fn_name: symbol,
                captures: Vec::new(),
                ty: MirType::Ptr,
            };
        }
        MirExpr::Var(name, mir_ty)
    }

    pub(crate) fn nullary_variant(&self, name: &str) -> Option<MirExpr> {
        match name {
            "None" => {
                return Some(MirExpr::ConstructVariant {
                    type_name: "Option".into(),
                    variant: "None".into(),
                    tag: 1,
                    fields: vec![],
                    ty: MirType::Struct("Option".into()),
                });
            }
            "Less" => return Some(MirExpr::Lit(MirLiteral::Int(0), MirType::Int)),
            "Equal" => return Some(MirExpr::Lit(MirLiteral::Int(1), MirType::Int)),
            "Greater" => return Some(MirExpr::Lit(MirLiteral::Int(2), MirType::Int)),
            _ => {}
        }
        for def in &self.module.sum_types {
            if let Some(v) = def.variant(name) {
                if v.fields.is_empty() {
                    if self.is_unboxed_sum(&def.name) {
                        return Some(MirExpr::Lit(MirLiteral::Int(v.tag as i64), MirType::Int));
                    }
                    return Some(MirExpr::ConstructVariant {
                        type_name: def.name.clone(),
                        variant: v.name.clone(),
                        tag: v.tag as i64,
                        fields: vec![],
                        ty: MirType::Struct(def.name.clone()),
                    });
                }
            }
        }
        None
    }

    fn lower_binary(&mut self, b: &ast::BinaryExpr) -> MirExpr {
        use SyntaxKind::*;
        let op_kind = b.op_kind();
        let lhs_ast = b.lhs();
        let rhs_ast = b.rhs();
        let lhs_ty = lhs_ast
            .as_ref()
            .and_then(|l| self.ty_of_node(l.syntax()));
        let lhs = match &lhs_ast {
            Some(l) => self.lower_expr(l),
            None => MirExpr::Unit,
        };

        // Pipe: `a |> f` is exactly `f(a)`.
        if op_kind == Some(PIPE_GT) {
            let rhs = match &rhs_ast {
                Some(r) => self.lower_expr(r),
                None => MirExpr::Unit,
            };
            let ty = self.mir_ty_of(b.syntax());
            return match rhs {
                MirExpr::MakeClosure { fn_name, captures, .. } if captures.is_empty() => {
                    MirExpr::Call {
                        func: Box::new(MirExpr::Var(
                            fn_name,
                            MirType::FnPtr(vec![lhs.ty()], Box::new(ty.clone())),
                        )),
                        args: vec![lhs],
                        ty,
                    }
                }
                closure => MirExpr::ClosureCall {
                    closure: Box::new(closure),
                    args: vec![lhs],
                    ty,
                },
            };
        }

        // Short-circuit boolean operators lower to branches.
        if op_kind == Some(AND_KW) || op_kind == Some(OR_KW) {
            let rhs = match &rhs_ast {
                Some(r) => self.lower_expr(r),
                None => MirExpr::Lit(MirLiteral::Bool(false), MirType::Bool),
            };
            let (then_body, else_body) = if op_kind == Some(AND_KW) {
                (rhs, MirExpr::Lit(MirLiteral::Bool(false), MirType::Bool))
            } else {
                (MirExpr::Lit(MirLiteral::Bool(true), MirType::Bool), rhs)
            };
            return MirExpr::If {
                cond: Box::new(lhs),
                then_body: Box::new(then_body),
                else_body: Box::new(else_body),
                ty: MirType::Bool,
            };
        }

        let rhs = match &rhs_ast {
            Some(r) => self.lower_expr(r),
            None => MirExpr::Unit,
        };
        let result_ty = self.mir_ty_of(b.syntax());
        let operand_head = lhs_ty.as_ref().and_then(|t| t.head_name().map(str::to_string));

        match op_kind {
            Some(PLUS_PLUS) => match operand_head.as_deref() {
                Some("List") => rt_call("mesh_list_concat", vec![lhs, rhs], MirType::Ptr),
                _ => rt_call("mesh_string_concat", vec![lhs, rhs], MirType::String),
            },
            Some(PLUS | MINUS | STAR | SLASH | PERCENT) => {
                let op = match op_kind {
                    Some(PLUS) => BinOp::Add,
                    Some(MINUS) => BinOp::Sub,
                    Some(STAR) => BinOp::Mul,
                    Some(SLASH) => BinOp::Div,
                    _ => BinOp::Mod,
                };
                match operand_head.as_deref() {
                    Some("Int") | Some("Float") | None => MirExpr::BinOp {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        ty: result_ty,
                    },
                    Some(_) => {
                        // User numeric trait: the operator is the
                        // interface call.
                        let (trait_name, method) = match op {
                            BinOp::Add => ("Add", "add"),
                            BinOp::Sub => ("Sub", "sub"),
                            BinOp::Mul => ("Mul", "mul"),
                            _ => ("Div", "div"),
                        };
                        let ty = lhs_ty.clone().unwrap_or(Ty::int());
                        let mangled = mangle_trait_method(trait_name, method, &ty);
                        MirExpr::Call {
                            func: Box::new(MirExpr::Var(
                                mangled,
                                MirType::FnPtr(
                                    vec![lhs.ty(), rhs.ty()],
                                    Box::new(result_ty.clone()),
                                ),
                            )),
                            args: vec![lhs, rhs],
                            ty: result_ty,
                        }
                    }
                }
            }
            Some(EQ_EQ | NOT_EQ) => {
                let eq = self.lower_equality(lhs, rhs, lhs_ty.as_ref());
                if op_kind == Some(NOT_EQ) {
                    MirExpr::UnaryOp {
                        op: UnaryOp::Not,
                        operand: Box::new(eq),
                        ty: MirType::Bool,
                    }
                } else {
                    eq
                }
            }
            Some(LT | GT | LT_EQ | GT_EQ) => {
                let op = match op_kind {
                    Some(LT) => BinOp::Lt,
                    Some(GT) => BinOp::Gt,
                    Some(LT_EQ) => BinOp::LtEq,
                    _ => BinOp::GtEq,
                };
                match operand_head.as_deref() {
                    Some("String") => {
                        // Compare by content, then test the ordering tag.
                        let cmp =
                            rt_call("mesh_string_compare", vec![lhs, rhs], MirType::Int);
                        let target = match op {
                            BinOp::Lt | BinOp::GtEq => 0i64,
                            _ => 2i64,
                        };
                        let test = MirExpr::BinOp {
                            op: BinOp::Eq,
                            lhs: Box::new(cmp),
                            rhs: Box::new(MirExpr::Lit(MirLiteral::Int(target), MirType::Int)),
                            ty: MirType::Bool,
                        };
                        if matches!(op, BinOp::GtEq | BinOp::LtEq) {
                            MirExpr::UnaryOp {
                                op: UnaryOp::Not,
                                operand: Box::new(test),
                                ty: MirType::Bool,
                            }
                        } else {
                            test
                        }
                    }
                    Some("Int") | Some("Float") | Some("Bool") | None => MirExpr::BinOp {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        ty: MirType::Bool,
                    },
                    Some(_) => {
                        let ty = lhs_ty.clone().unwrap_or(Ty::int());
                        let mangled = mangle_trait_method("Ord", "compare", &ty);
                        let cmp = MirExpr::Call {
                            func: Box::new(MirExpr::Var(
                                mangled,
                                MirType::FnPtr(
                                    vec![lhs.ty(), rhs.ty()],
                                    Box::new(MirType::Int),
                                ),
                            )),
                            args: vec![lhs, rhs],
                            ty: MirType::Int,
                        };
                        // Ordering tags: Less=0, Equal=1, Greater=2.
                        let (target, negate) = match op {
                            BinOp::Lt => (0, false),
                            BinOp::GtEq => (0, true),
                            BinOp::Gt => (2, false),
                            _ => (2, true),
                        };
                        let test = MirExpr::BinOp {
                            op: BinOp::Eq,
                            lhs: Box::new(cmp),
                            rhs: Box::new(MirExpr::Lit(MirLiteral::Int(target), MirType::Int)),
                            ty: MirType::Bool,
                        };
                        if negate {
                            MirExpr::UnaryOp {
                                op: UnaryOp::Not,
                                operand: Box::new(test),
                                ty: MirType::Bool,
                            }
                        } else {
                            test
                        }
                    }
                }
            }
            _ => MirExpr::Unit,
        }
    }

    pub(crate) fn lower_equality(
        &mut self,
        lhs: MirExpr,
        rhs: MirExpr,
        ty: Option<&Ty>,
    ) -> MirExpr {
        let head = ty.and_then(|t| t.head_name());
        match head {
            Some("String") => {
                // mesh_string_eq returns 0/1; codegen converts to i1.
                rt_call("mesh_string_eq", vec![lhs, rhs], MirType::Bool)
            }
            Some("Int") | Some("Float") | Some("Bool") | Some("Pid") | Some("Ordering")
            | None => MirExpr::BinOp {
                op: BinOp::Eq,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                ty: MirType::Bool,
            },
            Some(_) => {
                let ty = ty.cloned().unwrap_or(Ty::int());
                let mangled = mangle_trait_method("Eq", "eq", &ty);
                MirExpr::Call {
                    func: Box::new(MirExpr::Var(
                        mangled,
                        MirType::FnPtr(vec![lhs.ty(), rhs.ty()], Box::new(MirType::Bool)),
                    )),
                    args: vec![lhs, rhs],
                    ty: MirType::Bool,
                }
            }
        }
    }

    fn lower_unary(&mut self, u: &ast::UnaryExpr) -> MirExpr {
        let operand = match u.operand() {
            Some(o) => self.lower_expr(&o),
            None => MirExpr::Unit,
        };
        let ty = operand.ty();
        match u.op_kind() {
            Some(SyntaxKind::NOT_KW) => MirExpr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                ty: MirType::Bool,
            },
            _ => MirExpr::UnaryOp {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                ty,
            },
        }
    }

    fn lower_if(&mut self, i: &ast::IfExpr) -> MirExpr {
        let cond = match i.condition() {
            Some(c) => self.lower_expr(&c),
            None => MirExpr::Lit(MirLiteral::Bool(false), MirType::Bool),
        };
        let then_body = match i.then_block() {
            Some(b) => self.lower_block(&b),
            None => MirExpr::Unit,
        };
        let else_body = match i.else_block() {
            Some(b) => self.lower_block(&b),
            None => MirExpr::Unit,
        };
        let ty = if i.else_block().is_some() {
            then_body.ty()
        } else {
            MirType::Unit
        };
        MirExpr::If {
            cond: Box::new(cond),
            then_body: Box::new(then_body),
            else_body: Box::new(else_body),
            ty,
        }
    }

    fn lower_for(&mut self, f: &ast::ForExpr) -> MirExpr {
        let iterable_ast = f.iterable();
        let iter_ty = iterable_ast.as_ref().and_then(|e| self.ty_of_node(e.syntax()));
        let (kind, binding_ty) = match iter_ty.as_ref() {
            Some(Ty::Con(n)) if n == "Range" => (ForKind::Range, MirType::Int),
            Some(Ty::App(n, args)) if n == "Map" => (
                ForKind::Map,
                MirType::Tuple(vec![
                    self.ty_to_mir(&args[0]),
                    self.ty_to_mir(&args[1]),
                ]),
            ),
            Some(Ty::App(n, args)) if n == "Set" => {
                (ForKind::Set, self.ty_to_mir(&args[0]))
            }
            Some(Ty::App(n, args)) if n == "List" || n == "Iter" => {
                (ForKind::List, self.ty_to_mir(&args[0]))
            }
            _ => (ForKind::List, MirType::Int),
        };
        let iterable = match &iterable_ast {
            Some(e) => self.lower_expr(e),
            None => MirExpr::Unit,
        };
        let binding = f.binding().map(|n| n.text()).unwrap_or_else(|| "_".into());

        self.push_scope();
        self.bind(&binding, binding_ty.clone());
        let filter = f
            .filter()
            .and_then(|g| g.condition())
            .map(|c| Box::new(self.lower_expr(&c)));
        let body = match f.body() {
            Some(b) => self.lower_block(&b),
            None => MirExpr::Unit,
        };
        self.pop_scope();

        MirExpr::ForIn {
            binding,
            binding_ty,
            kind,
            iterable: Box::new(iterable),
            filter,
            body: Box::new(body),
        }
    }

    fn lower_lambda(&mut self, l: &ast::LambdaExpr) -> MirExpr {
        self.lambda_counter += 1;
        let fn_name = format!(
            "{}__lambda{}",
            self.opts.module_name.replace('.', "_"),
            self.lambda_counter
        );

        // Captures: free names of the body that resolve to enclosing
        // locals, in first-use order.
        let captures = self.free_locals(l);

        self.push_scope();
        let mut params = Vec::new();
        for (i, p) in l.params().iter().enumerate() {
            let pname = p.name().map(|n| n.text()).unwrap_or_else(|| format!("__p{i}"));
            let pty = p
                .syntax()
                .children()
                .find_map(|c| self.ty_of_node(&c))
                .map(|t| self.ty_to_mir(&t))
                .unwrap_or(MirType::Int);
            self.bind(&pname, pty.clone());
            params.push((pname, pty));
        }
        for (name, ty) in &captures {
            self.bind(name, ty.clone());
        }
        let body = match l.body() {
            Some(b) => self.lower_block(&b),
            None => MirExpr::Unit,
        };
        self.pop_scope();

        // The lifted body unpacks its captures from the env tuple.
        let mut stmts = Vec::new();
        for (i, (name, ty)) in captures.iter().enumerate() {
            stmts.push(MirExpr::Let {
                name: name.clone(),
                ty: ty.clone(),
                value: Box::new(MirExpr::TupleField {
                    object: Box::new(MirExpr::Var("__env".into(), MirType::Ptr)),
                    index: i,
                    ty: ty.clone(),
                }),
            });
        }
        let body_ty = body.ty();
        stmts.push(body);
        let wrapped_body = if captures.is_empty() {
            stmts.pop().unwrap()
        } else {
            MirExpr::Block(stmts, body_ty.clone())
        };

        self.lifted.push(MirFunction {
            name: fn_name.clone(),
            params,
            return_type: body_ty,
            body: wrapped_body,
            is_closure_fn: true,
            captures: captures.clone(),
        });

        let capture_exprs = captures
            .iter()
            .map(|(name, ty)| MirExpr::Var(name.clone(), ty.clone()))
            .collect();
        MirExpr::MakeClosure {
            fn_name,
            captures: capture_exprs,
            ty: MirType::Ptr,
        }
    }

    /// Names used inside the lambda that are bound in enclosing scopes.
    fn free_locals(&self, l: &ast::LambdaExpr) -> Vec<(String, MirType)> {
        let param_names: Vec<String> = l
            .params()
            .iter()
            .filter_map(|p| p.name().map(|n| n.text()))
            .collect();
        let mut out: Vec<(String, MirType)> = Vec::new();
        for node in l.syntax().descendants() {
            if node.kind() == SyntaxKind::NAME_REF {
                let name = node.text().to_string();
                if param_names.contains(&name) || out.iter().any(|(n, _)| *n == name) {
                    continue;
                }
                // Let-bindings inside the lambda shadow outer locals; a
                // conservative scan keeps them captured only when an
                // enclosing scope already binds them.
                if let Some(ty) = self.local_ty(&name) {
                    out.push((name, ty));
                }
            }
        }
        out
    }

    fn lower_receive(&mut self, r: &ast::ReceiveExpr) -> MirExpr {
        let msg_var = self.fresh_temp("msg");
        self.push_scope();
        self.bind(&msg_var, MirType::Int);
        let arms: Vec<ast::CaseArm> = r.arms().collect();
        let result_ty = self.mir_ty_of(r.syntax());
        let scrutinee = MirExpr::Var(msg_var.clone(), MirType::Int);
        let dispatch = self.compile_arms(
            scrutinee,
            None,
            &arms,
            result_ty.clone(),
            MirExpr::Panic {
                message: "receive: unmatched message".into(),
            },
        );
        self.pop_scope();

        let timeout = r.after().map(|after| {
            let timeout_ms = match after.timeout() {
                Some(t) => self.lower_expr(&t),
                None => MirExpr::Lit(MirLiteral::Int(0), MirType::Int),
            };
            let body = match after.body() {
                Some(b) => self.lower_expr(&b),
                None => MirExpr::Unit,
            };
            (Box::new(timeout_ms), Box::new(body))
        });

        MirExpr::ActorReceive {
            binding: msg_var,
            dispatch: Box::new(dispatch),
            timeout,
            ty: result_ty,
        }
    }

    fn lower_spawn(&mut self, s: &ast::SpawnExpr) -> MirExpr {
        let args: Vec<Expr> = s
            .arg_list()
            .map(|al| al.args().collect())
            .unwrap_or_default();
        let Some(target) = args.first() else {
            return MirExpr::Unit;
        };

        // The spawn target must be a known function so a tuple-unpacking
        // wrapper can be generated for the scheduler entry signature.
        let symbol = match target {
            Expr::NameRef(n) => {
                let name = n.text();
                self.local_fns
                    .get(&name)
                    .or_else(|| self.opts.extern_fns.get(&name))
                    .cloned()
            }
            _ => None,
        };
        let lowered_args: Vec<MirExpr> =
            args[1..].iter().map(|a| self.lower_expr(a)).collect();

        let Some(symbol) = symbol else {
            return MirExpr::Unit;
        };
        let wrapper = self.spawn_wrapper_for(&symbol, &lowered_args);
        MirExpr::ActorSpawn {
            wrapper,
            args: lowered_args,
            ty: MirType::Int,
        }
    }

    /// One wrapper per spawn target: `fn target__spawn(args: ptr)` that
    /// unpacks the packed tuple and tail-calls the target.
    fn spawn_wrapper_for(&mut self, symbol: &str, args: &[MirExpr]) -> String {
        if let Some(existing) = self.spawn_wrappers.get(symbol) {
            return existing.clone();
        }
        let wrapper = format!("{symbol}__spawn");
        let arg_tys: Vec<MirType> = args.iter().map(|a| a.ty()).collect();
        let env = MirExpr::Var("__args".into(), MirType::Ptr);
        let call_args: Vec<MirExpr> = arg_tys
            .iter()
            .enumerate()
            .map(|(i, ty)| MirExpr::TupleField {
                object: Box::new(env.clone()),
                index: i,
                ty: ty.clone(),
            })
            .collect();
        let body = MirExpr::Call {
            func: Box::new(MirExpr::Var(
                symbol.to_string(),
                MirType::FnPtr(arg_tys, Box::new(MirType::Unit)),
            )),
            args: call_args,
            ty: MirType::Unit,
        };
        self.lifted.push(MirFunction {
            name: wrapper.clone(),
            params: vec![("__args".into(), MirType::Ptr)],
            return_type: MirType::Unit,
            body,
            is_closure_fn: false,
            captures: Vec::new(),
        });
        self.spawn_wrappers.insert(symbol.to_string(), wrapper.clone());
        wrapper
    }

    fn lower_send(&mut self, s: &ast::SendExpr) -> MirExpr {
        let args: Vec<Expr> = s
            .arg_list()
            .map(|al| al.args().collect())
            .unwrap_or_default();
        let target = match args.first() {
            Some(t) => self.lower_expr(t),
            None => MirExpr::Unit,
        };
        let message = match args.get(1) {
            Some(m) => self.lower_expr(m),
            None => MirExpr::Unit,
        };
        MirExpr::ActorSend {
            target: Box::new(target),
            message: Box::new(message),
        }
    }

    /// `expr?`: unwrap Ok or early-return the Err variant. Err payloads
    /// convert through From on propagation; same-type propagation is the
    /// identity conversion.
    fn lower_try(&mut self, t: &ast::TryExpr) -> MirExpr {
        let inner = match t.expr() {
            Some(e) => self.lower_expr(&e),
            None => MirExpr::Unit,
        };
        let tmp = self.fresh_temp("try");
        let result_ty = self.mir_ty_of(t.syntax());
        let tmp_var = MirExpr::Var(tmp.clone(), inner.ty());
        let is_ok = MirExpr::BinOp {
            op: BinOp::Eq,
            lhs: Box::new(MirExpr::GetTag {
                object: Box::new(tmp_var.clone()),
            }),
            rhs: Box::new(MirExpr::Lit(MirLiteral::Int(0), MirType::Int)),
            ty: MirType::Bool,
        };
        let ok_value = MirExpr::VariantField {
            object: Box::new(tmp_var.clone()),
            index: 0,
            ty: result_ty.clone(),
        };
        let err_value = MirExpr::VariantField {
            object: Box::new(tmp_var.clone()),
            index: 0,
            ty: MirType::Int,
        };
        let rethrow = MirExpr::Return(Box::new(MirExpr::ConstructVariant {
            type_name: "Result".into(),
            variant: "Err".into(),
            tag: 1,
            fields: vec![err_value],
            ty: MirType::Struct("Result".into()),
        }));
        MirExpr::Block(
            vec![
                MirExpr::Let {
                    name: tmp,
                    ty: tmp_var.ty(),
                    value: Box::new(inner),
                },
                MirExpr::If {
                    cond: Box::new(is_ok),
                    then_body: Box::new(ok_value),
                    else_body: Box::new(rethrow),
                    ty: result_ty.clone(),
                },
            ],
            result_ty,
        )
    }

    fn lower_struct_lit(&mut self, s: &ast::StructLit) -> MirExpr {
        let Some(name) = s.type_name().map(|n| n.text()) else {
            return MirExpr::Unit;
        };
        let Some(def) = self.module.struct_def(&name).cloned() else {
            return MirExpr::Unit;
        };
        let mut provided: FxHashMap<String, MirExpr> = FxHashMap::default();
        for field in s.fields() {
            if let (Some(fname), Some(value)) = (field.name(), field.value()) {
                let lowered = self.lower_expr(&value);
                provided.insert(fname.text(), lowered);
            }
        }
        // Fields in declaration order, as the slot layout demands.
        let fields = def
            .fields
            .iter()
            .map(|(fname, fty)| {
                provided
                    .remove(fname)
                    .unwrap_or(MirExpr::Lit(MirLiteral::Int(0), fty.clone()))
            })
            .collect();
        MirExpr::StructLit {
            name: name.clone(),
            fields,
            ty: MirType::Struct(name),
        }
    }

    fn lower_field_access(&mut self, fa: &ast::FieldAccess) -> MirExpr {
        let Some(field) = fa.field_name().map(|n| n.text()) else {
            return MirExpr::Unit;
        };
        let Some(base) = fa.base() else {
            return MirExpr::Unit;
        };

        if let Expr::NameRef(name_ref) = &base {
            let name = name_ref.text();
            if self.local_ty(&name).is_none() {
                // Qualified module function as a value.
                if let Some(fns) = self.opts.qualified_fns.get(&name) {
                    if let Some(symbol) = fns.get(&field) {
                        return MirExpr::MakeClosure {
                            fn_name: symbol.clone(),
                            captures: Vec::new(),
                            ty: MirType::Ptr,
                        };
                    }
                }
                // Variant constructor via the type name.
                if let Some(def) = self.module.sum_type_def(&name).cloned() {
                    if let Some(v) = def.variant(&field) {
                        if v.fields.is_empty() {
                            if self.is_unboxed_sum(&def.name) {
                                return MirExpr::Lit(
                                    MirLiteral::Int(v.tag as i64),
                                    MirType::Int,
                                );
                            }
                            return MirExpr::ConstructVariant {
                                type_name: def.name.clone(),
                                variant: v.name.clone(),
                                tag: v.tag as i64,
                                fields: vec![],
                                ty: MirType::Struct(def.name.clone()),
                            };
                        }
                    }
                }
            }
        }

        // Plain struct field load.
        let base_ty = self.ty_of_node(base.syntax());
        let object = self.lower_expr(&base);
        if let Some(Ty::Con(type_name)) = &base_ty {
            if let Some(def) = self.module.struct_def(type_name) {
                if let Some(index) = def.field_index(&field) {
                    let ty = def.fields[index].1.clone();
                    return MirExpr::FieldAccess {
                        object: Box::new(object),
                        index,
                        ty,
                    };
                }
            }
        }
        MirExpr::Unit
    }

    // ── Calls ───────────────────────────────────────────────────────────

    fn lower_call(&mut self, call: &ast::CallExpr) -> MirExpr {
        let args: Vec<Expr> = call
            .arg_list()
            .map(|al| al.args().collect())
            .unwrap_or_default();
        let result_ty = self.mir_ty_of(call.syntax());
        let Some(callee) = call.callee() else {
            return MirExpr::Unit;
        };

        match &callee {
            Expr::FieldAccess(fa) => self.lower_field_call(fa, &args, result_ty),
            Expr::NameRef(name_ref) => {
                let name = name_ref.text();
                // A local closure value shadows everything.
                if let Some(local) = self.local_ty(&name) {
                    let lowered_args: Vec<MirExpr> =
                        args.iter().map(|a| self.lower_expr(a)).collect();
                    return MirExpr::ClosureCall {
                        closure: Box::new(MirExpr::Var(name, local)),
                        args: lowered_args,
                        ty: result_ty,
                    };
                }
                // Module-local or imported function.
                if let Some(symbol) = self
                    .local_fns
                    .get(&name)
                    .or_else(|| self.opts.extern_fns.get(&name))
                    .cloned()
                {
                    let lowered_args: Vec<MirExpr> =
                        args.iter().map(|a| self.lower_expr(a)).collect();
                    return self.direct_call(symbol, lowered_args, result_ty);
                }
                // Variant constructor call.
                if let Some(ctor) = self.lower_ctor_call(&name, None, &args) {
                    return ctor;
                }
                // Bare-name trait method: identical MIR to dot syntax.
                if let Some(first) = args.first() {
                    let recv_ty = self.ty_of_node(first.syntax());
                    if let Some(recv_ty) = recv_ty {
                        if let Some(expr) =
                            self.trait_dispatch_call(&name, &recv_ty, &args, result_ty.clone())
                        {
                            return expr;
                        }
                    }
                }
                // Runtime builtin (println, range, ws_serve, ...).
                self.lower_builtin_call(&name, &args, result_ty)
            }
            other => {
                let closure = self.lower_expr(other);
                let lowered_args: Vec<MirExpr> =
                    args.iter().map(|a| self.lower_expr(a)).collect();
                MirExpr::ClosureCall {
                    closure: Box::new(closure),
                    args: lowered_args,
                    ty: result_ty,
                }
            }
        }
    }

    /// `base.m(args)`: module-qualified call, variant constructor, or
    /// method dispatch. Interception happens before the callee is
    /// lowered, so the receiver can be prepended to the argument list.
    fn lower_field_call(
        &mut self,
        fa: &ast::FieldAccess,
        args: &[Expr],
        result_ty: MirType,
    ) -> MirExpr {
        let Some(method) = fa.field_name().map(|n| n.text()) else {
            return MirExpr::Unit;
        };
        let Some(base) = fa.base() else {
            return MirExpr::Unit;
        };

        if let Expr::NameRef(name_ref) = &base {
            let name = name_ref.text();
            if self.local_ty(&name).is_none() {
                // Module-qualified call: `Vector.add(...)`.
                if let Some(fns) = self.opts.qualified_fns.get(&name) {
                    if let Some(symbol) = fns.get(&method).cloned() {
                        let lowered: Vec<MirExpr> =
                            args.iter().map(|a| self.lower_expr(a)).collect();
                        return self.direct_call(symbol, lowered, result_ty);
                    }
                }
                // Stdlib module call: `Math.sqrt(...)`.
                if let Some(symbol) = stdlib_module_symbol(&name, &method) {
                    let lowered: Vec<MirExpr> =
                        args.iter().map(|a| self.lower_expr(a)).collect();
                    return self.direct_call(symbol.to_string(), lowered, result_ty);
                }
                // Variant constructor: `Shape.Circle(...)`.
                if let Some(ctor) = self.lower_ctor_call(&method, Some(&name), args) {
                    return ctor;
                }
            }
        }

        // Method-call mode: lower the receiver, prepend it, dispatch.
        let recv_ty = self.ty_of_node(base.syntax());

        // Struct fields holding closures are called indirectly.
        if let Some(Ty::Con(type_name)) = &recv_ty {
            let field_info = self
                .module
                .struct_def(type_name)
                .and_then(|d| d.field_index(&method).map(|i| (i, d.fields[i].1.clone())));
            if let Some((index, fty @ MirType::Ptr)) = field_info {
                let object = self.lower_expr(&base);
                let lowered: Vec<MirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();
                return MirExpr::ClosureCall {
                    closure: Box::new(MirExpr::FieldAccess {
                        object: Box::new(object),
                        index,
                        ty: fty,
                    }),
                    args: lowered,
                    ty: result_ty,
                };
            }
        }

        let mut full_args: Vec<Expr> = Vec::with_capacity(args.len() + 1);
        full_args.push(base.clone());
        full_args.extend(args.iter().cloned());
        if let Some(recv_ty) = recv_ty {
            if let Some(expr) =
                self.trait_dispatch_call(&method, &recv_ty, &full_args, result_ty.clone())
            {
                return expr;
            }
            // Stdlib method on a built-in type.
            if let Some(head) = recv_ty.head_name() {
                if let Some(symbol) = builtin_method_symbol(head, &method) {
                    let lowered: Vec<MirExpr> = full_args
                        .iter()
                        .map(|a| self.lower_expr(a))
                        .collect();
                    return self.lower_runtime_method(symbol, lowered, result_ty);
                }
            }
        }
        MirExpr::Unit
    }

    /// The shared trait-dispatch helper. Bare-name calls and dot-syntax
    /// calls both land here, so they produce identical MIR. Primitive
    /// receivers route to runtime intrinsics or inline operations; user
    /// types dispatch on the mangled `Trait__Method__Type` symbol.
    fn trait_dispatch_call(
        &mut self,
        method: &str,
        recv_ty: &Ty,
        args: &[Expr],
        result_ty: MirType,
    ) -> Option<MirExpr> {
        let mut registry_ctx = mesh_typeck::unify::TyCtx::new();
        let traits = self
            .typeck
            .trait_registry
            .find_method_traits(method, recv_ty, &mut registry_ctx);
        if traits.len() != 1 {
            return None;
        }
        if let Some(head) = recv_ty.head_name() {
            if matches!(head, "Int" | "Float" | "Bool" | "String" | "Pid" | "Ordering") {
                let head = head.to_string();
                let lowered: Vec<MirExpr> =
                    args.iter().map(|a| self.lower_expr(a)).collect();
                return Some(self.primitive_trait_call(&traits[0], method, &head, lowered));
            }
        }
        let mangled = mangle_trait_method(&traits[0], method, recv_ty);
        let lowered: Vec<MirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();
        let param_tys: Vec<MirType> = lowered.iter().map(|a| a.ty()).collect();
        Some(MirExpr::Call {
            func: Box::new(MirExpr::Var(
                mangled,
                MirType::FnPtr(param_tys, Box::new(result_ty.clone())),
            )),
            args: lowered,
            ty: result_ty,
        })
    }

    /// Built-in trait impls on primitives have no synthesized bodies;
    /// their dispatch lands on runtime symbols (or inline ops) instead.
    fn primitive_trait_call(
        &mut self,
        trait_name: &str,
        method: &str,
        head: &str,
        mut args: Vec<MirExpr>,
    ) -> MirExpr {
        let recv = args.remove(0);
        let other = args.pop();
        match (trait_name, method) {
            ("Display", "to_string") | ("Debug", "inspect") => match head {
                "String" => recv,
                "Float" => rt_call("mesh_float_to_string", vec![recv], MirType::String),
                "Bool" => rt_call("mesh_bool_to_string", vec![recv], MirType::String),
                _ => rt_call("mesh_int_to_string", vec![recv], MirType::String),
            },
            ("Eq", "eq") => {
                let other = other.unwrap_or(MirExpr::Unit);
                if head == "String" {
                    rt_call("mesh_string_eq", vec![recv, other], MirType::Bool)
                } else {
                    MirExpr::BinOp {
                        op: BinOp::Eq,
                        lhs: Box::new(recv),
                        rhs: Box::new(other),
                        ty: MirType::Bool,
                    }
                }
            }
            ("Ord", "compare") => {
                let other = other.unwrap_or(MirExpr::Unit);
                let symbol = match head {
                    "String" => "mesh_string_compare",
                    "Float" => "mesh_float_compare",
                    _ => "mesh_int_compare",
                };
                rt_call(symbol, vec![recv, other], MirType::Int)
            }
            ("Hash", "hash") => match head {
                "String" => rt_call("mesh_string_hash", vec![recv], MirType::Int),
                "Float" => rt_call("mesh_float_bits", vec![recv], MirType::Int),
                _ => recv,
            },
            ("Add" | "Sub" | "Mul" | "Div", _) => {
                let other = other.unwrap_or(MirExpr::Unit);
                let op = match trait_name {
                    "Add" => BinOp::Add,
                    "Sub" => BinOp::Sub,
                    "Mul" => BinOp::Mul,
                    _ => BinOp::Div,
                };
                let ty = recv.ty();
                MirExpr::BinOp {
                    op,
                    lhs: Box::new(recv),
                    rhs: Box::new(other),
                    ty,
                }
            }
            ("Neg", "neg") => {
                let ty = recv.ty();
                MirExpr::UnaryOp {
                    op: UnaryOp::Neg,
                    operand: Box::new(recv),
                    ty,
                }
            }
            _ => recv,
        }
    }

    fn direct_call(
        &mut self,
        symbol: String,
        args: Vec<MirExpr>,
        result_ty: MirType,
    ) -> MirExpr {
        let param_tys: Vec<MirType> = args.iter().map(|a| a.ty()).collect();
        MirExpr::Call {
            func: Box::new(MirExpr::Var(
                symbol,
                MirType::FnPtr(param_tys, Box::new(result_ty.clone())),
            )),
            args,
            ty: result_ty,
        }
    }

    fn lower_ctor_call(
        &mut self,
        variant: &str,
        type_name: Option<&str>,
        args: &[Expr],
    ) -> Option<MirExpr> {
        // Builtin Option/Result constructors.
        match variant {
            "Some" | "Ok" | "Err" => {
                let lowered: Vec<MirExpr> =
                    args.iter().map(|a| self.lower_expr(a)).collect();
                let (ty_name, tag) = match variant {
                    "Some" => ("Option", 0),
                    "Ok" => ("Result", 0),
                    _ => ("Result", 1),
                };
                return Some(MirExpr::ConstructVariant {
                    type_name: ty_name.into(),
                    variant: variant.into(),
                    tag,
                    fields: lowered,
                    ty: MirType::Struct(ty_name.into()),
                });
            }
            _ => {}
        }

        let def = match type_name {
            Some(t) => self.module.sum_type_def(t).cloned(),
            None => self
                .module
                .sum_types
                .iter()
                .find(|d| d.variant(variant).is_some())
                .cloned(),
        }?;
        let v = def.variant(variant)?.clone();
        let lowered: Vec<MirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();
        if v.fields.is_empty() && self.is_unboxed_sum(&def.name) {
            return Some(MirExpr::Lit(MirLiteral::Int(v.tag as i64), MirType::Int));
        }
        Some(MirExpr::ConstructVariant {
            type_name: def.name.clone(),
            variant: v.name.clone(),
            tag: v.tag as i64,
            fields: lowered,
            ty: MirType::Struct(def.name),
        })
    }

    /// Global runtime builtins. Callback-taking servers split closure
    /// arguments into an `(fn, env)` pair to match the runtime ABI.
    fn lower_builtin_call(
        &mut self,
        name: &str,
        args: &[Expr],
        result_ty: MirType,
    ) -> MirExpr {
        let lowered: Vec<MirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();
        match name {
            "http_serve" => {
                // http_serve(port, handler) -> mesh_http_serve(fn, env, port)
                let mut it = lowered.into_iter();
                let port = it.next().unwrap_or(MirExpr::Unit);
                let handler = it.next().unwrap_or(MirExpr::Unit);
                let (f, env) = split_closure(handler);
                rt_call("mesh_http_serve", vec![f, env, port], MirType::Unit)
            }
            "ws_serve" | "ws_serve_tls" => {
                // ws_serve(on_connect, on_msg, on_close, port[, cert, key])
                let mut flat = Vec::new();
                let mut it = lowered.into_iter();
                for _ in 0..3 {
                    let (f, env) = split_closure(it.next().unwrap_or(MirExpr::Unit));
                    flat.push(f);
                    flat.push(env);
                }
                flat.extend(it);
                let symbol = map_builtin_name(name);
                rt_call(symbol, flat, MirType::Unit)
            }
            "panic" => {
                let msg = lowered.into_iter().next().unwrap_or(MirExpr::Unit);
                rt_call("mesh_panic", vec![msg], MirType::Unit)
            }
            _ => {
                let symbol = map_builtin_name(name);
                rt_call(symbol, lowered, result_ty)
            }
        }
    }

    /// Runtime collection methods whose ABI takes `(fn, env)` for their
    /// function-valued argument.
    fn lower_runtime_method(
        &mut self,
        symbol: &str,
        mut args: Vec<MirExpr>,
        result_ty: MirType,
    ) -> MirExpr {
        let takes_callback = matches!(
            symbol,
            "mesh_list_map" | "mesh_list_filter" | "mesh_list_flat_map" | "mesh_list_fold"
                | "mesh_iter_map" | "mesh_iter_filter"
        );
        if takes_callback {
            // The function argument is the last one; split it.
            if let Some(last) = args.pop() {
                let (f, env) = split_closure(last);
                args.push(f);
                args.push(env);
            }
        }
        rt_call(symbol, args, result_ty)
    }
}

/// Build a call to a runtime symbol.
pub(crate) fn rt_call(symbol: &str, args: Vec<MirExpr>, ty: MirType) -> MirExpr {
    let param_tys: Vec<MirType> = args.iter().map(|a| a.ty()).collect();
    MirExpr::Call {
        func: Box::new(MirExpr::Var(
            symbol.to_string(),
            MirType::FnPtr(param_tys, Box::new(ty.clone())),
        )),
        args,
        ty,
    }
}

/// Split a function value into the `(fn_ptr, env)` pair the runtime ABI
/// expects; bare functions pass a null env.
fn split_closure(value: MirExpr) -> (MirExpr, MirExpr) {
    match value {
        MirExpr::MakeClosure { fn_name, captures, .. } if captures.is_empty() => (
            MirExpr::FnRef(fn_name, MirType::Ptr),
            MirExpr::Lit(MirLiteral::Int(0), MirType::Ptr),
        ),
        MirExpr::MakeClosure { fn_name, captures, .. } => {
            let env_ty = MirType::Tuple(captures.iter().map(|c| c.ty()).collect());
            (
                MirExpr::FnRef(fn_name, MirType::Ptr),
                MirExpr::Tuple {
                    items: captures,
                    ty: env_ty,
                },
            )
        }
        other => {
            // A closure value at runtime: pass the pair's components.
            (
                MirExpr::TupleField {
                    object: Box::new(other.clone()),
                    index: 0,
                    ty: MirType::Ptr,
                },
                MirExpr::TupleField {
                    object: Box::new(other),
                    index: 1,
                    ty: MirType::Ptr,
                },
            )
        }
    }
}
