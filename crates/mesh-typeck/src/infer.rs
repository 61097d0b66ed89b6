//! The inference engine: an Algorithm-J style walker over the typed AST.
//!
//! Inference is best-effort: every error is recorded and replaced with a
//! fresh variable so checking continues. The walker also owns method-dot
//! resolution, auto-derive registration, import binding, and match
//! exhaustiveness checking.

use crate::builtins;
use crate::env::TypeEnv;
use crate::error::TypeError;
use crate::exhaustiveness::{self, ArmPat, SimplePat};
use crate::traits::{ImplMethodSig, TraitDef, TraitImplDef, TraitMethodSig, TraitRegistry};
use crate::ty::{Scheme, Ty};
use crate::unify::TyCtx;
use crate::{ImportContext, TypeckResult};
use mesh_common::Span;
use mesh_parser::ast::{self, AstNode, Expr, Item, Pattern, Stmt, TypeRef};
use mesh_parser::{Parse, SyntaxNode};
use rowan::TextRange;
use rustc_hash::FxHashMap;

/// The traits the deriving clause accepts.
pub const DERIVABLE: &[&str] = &["Eq", "Ord", "Debug", "Display", "Hash"];

/// Default derive set applied when no clause is present, preserving
/// sources written before the feature existed.
pub const DEFAULT_STRUCT_DERIVES: &[&str] = &["Debug", "Eq", "Ord", "Hash"];
pub const DEFAULT_SUM_DERIVES: &[&str] = &["Debug", "Eq", "Ord"];

// ── Type registry ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StructDefInfo {
    pub name: String,
    pub fields: Vec<(String, Ty)>,
    pub derives: Vec<String>,
    pub is_pub: bool,
}

#[derive(Debug, Clone)]
pub struct VariantInfo {
    pub name: String,
    pub fields: Vec<Ty>,
    pub tag: u8,
}

#[derive(Debug, Clone)]
pub struct SumTypeDefInfo {
    pub name: String,
    pub variants: Vec<VariantInfo>,
    pub derives: Vec<String>,
    pub is_pub: bool,
}

/// All struct and sum type definitions visible to the current module.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    pub struct_defs: FxHashMap<String, StructDefInfo>,
    pub sum_type_defs: FxHashMap<String, SumTypeDefInfo>,
}

impl TypeRegistry {
    /// Find the sum type owning a variant name, when unambiguous.
    pub fn variant_owner(&self, variant: &str) -> Option<&SumTypeDefInfo> {
        let mut found = None;
        for def in self.sum_type_defs.values() {
            if def.variants.iter().any(|v| v.name == variant) {
                if found.is_some() {
                    return None;
                }
                found = Some(def);
            }
        }
        found
    }
}

// ── Entry points ────────────────────────────────────────────────────────

pub fn infer(parse: &Parse) -> TypeckResult {
    infer_with_imports(parse, &ImportContext::default())
}

pub fn infer_with_imports(parse: &Parse, import_ctx: &ImportContext) -> TypeckResult {
    let mut inferencer = Inferencer::new(import_ctx);
    inferencer.run(&parse.tree());
    inferencer.finish()
}

struct SelfCtx {
    ty: Ty,
    assoc: FxHashMap<String, Ty>,
}

struct Inferencer<'a> {
    ctx: TyCtx,
    env: TypeEnv,
    traits: TraitRegistry,
    registry: TypeRegistry,
    errors: Vec<TypeError>,
    warnings: Vec<TypeError>,
    types: FxHashMap<TextRange, Ty>,
    fn_schemes: FxHashMap<String, Scheme>,
    import_ctx: &'a ImportContext,
    /// Namespace alias -> full module name, from `import M.N`.
    qualified_modules: FxHashMap<String, String>,
    imported_functions: Vec<String>,
    default_method_bodies: FxHashMap<(String, String), TextRange>,
    /// Return types of the enclosing fn/lambda stack.
    return_stack: Vec<Ty>,
    result_type: Option<Ty>,
}

impl<'a> Inferencer<'a> {
    fn new(import_ctx: &'a ImportContext) -> Self {
        let mut ctx = TyCtx::new();
        let mut env = TypeEnv::new();
        let mut traits = TraitRegistry::new();
        builtins::install(&mut env, &mut ctx);
        builtins::install_traits(&mut traits);
        for def in &import_ctx.all_trait_defs {
            traits.define_trait(def.clone());
        }
        for impl_def in &import_ctx.all_trait_impls {
            traits.add_impl(impl_def.clone());
        }
        Inferencer {
            ctx,
            env,
            traits,
            registry: TypeRegistry::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            types: FxHashMap::default(),
            fn_schemes: FxHashMap::default(),
            import_ctx,
            qualified_modules: FxHashMap::default(),
            imported_functions: Vec::new(),
            default_method_bodies: FxHashMap::default(),
            return_stack: Vec::new(),
            result_type: None,
        }
    }

    fn finish(mut self) -> TypeckResult {
        let resolved: FxHashMap<TextRange, Ty> = self
            .types
            .iter()
            .map(|(range, ty)| (*range, self.ctx.resolve(ty)))
            .collect();
        let result_type = self.result_type.as_ref().map(|t| self.ctx.resolve(t));
        let fn_schemes = self
            .fn_schemes
            .iter()
            .map(|(name, scheme)| {
                (
                    name.clone(),
                    Scheme {
                        vars: scheme.vars.clone(),
                        ty: self.ctx.resolve(&scheme.ty),
                    },
                )
            })
            .collect();
        let qualified_modules = self
            .qualified_modules
            .iter()
            .map(|(alias, full)| {
                let fns = self
                    .import_ctx
                    .modules
                    .get(full)
                    .map(|m| m.functions.keys().cloned().collect())
                    .unwrap_or_default();
                (alias.clone(), fns)
            })
            .collect();
        TypeckResult {
            types: resolved,
            errors: self.errors,
            warnings: self.warnings,
            result_type,
            type_registry: self.registry,
            trait_registry: self.traits,
            default_method_bodies: self.default_method_bodies,
            qualified_modules,
            imported_functions: self.imported_functions,
            fn_schemes,
        }
    }

    fn error(&mut self, err: TypeError) {
        self.errors.push(err);
    }

    fn span_of(node: &SyntaxNode) -> Span {
        node.text_range().into()
    }

    fn record(&mut self, node: &SyntaxNode, ty: &Ty) {
        self.types.insert(node.text_range(), ty.clone());
    }

    fn unify_or_report(&mut self, expected: &Ty, found: &Ty, span: Span) {
        if let Err(e) = self.ctx.unify(expected, found) {
            self.error(TypeError::TypeMismatch {
                expected: e.expected,
                found: e.found,
                span,
            });
        }
    }

    // ── Driver ──────────────────────────────────────────────────────────

    fn run(&mut self, tree: &ast::SourceFile) {
        let items: Vec<Item> = tree.items().collect();

        self.collect_type_defs(&items);
        self.collect_interfaces(&items);
        self.collect_impl_headers(&items);
        self.process_imports(&items);
        self.register_fn_signatures(&items);

        // Bodies, in source order; top-level lets thread through the env.
        for item in &items {
            match item {
                Item::FnDef(f) => self.check_fn_body(f, None),
                Item::ImplDef(i) => self.check_impl_bodies(i),
                Item::LetStmt(l) => {
                    let ty = self.infer_let(l);
                    self.result_type = Some(ty);
                }
                _ => {}
            }
        }

        // Script-style trailing expressions.
        for expr in tree.trailing_exprs() {
            let ty = self.infer_expr(&expr);
            self.result_type = Some(ty);
        }
    }

    // ── Declaration collection ──────────────────────────────────────────

    fn collect_type_defs(&mut self, items: &[Item]) {
        for item in items {
            match item {
                Item::StructDef(s) => self.collect_struct(s),
                Item::SumTypeDef(t) => self.collect_sum_type(t),
                _ => {}
            }
        }
    }

    fn collect_struct(&mut self, s: &ast::StructDef) {
        let Some(name) = s.name().map(|n| n.text()) else {
            return;
        };
        if self.registry.struct_defs.contains_key(&name) {
            self.error(TypeError::DuplicateDefinition {
                name: name.clone(),
                span: Self::span_of(s.syntax()),
            });
            return;
        }
        let mut generics = FxHashMap::default();
        let fields: Vec<(String, Ty)> = s
            .fields()
            .filter_map(|f| {
                let fname = f.name()?.text();
                let ty = match f.ty() {
                    Some(t) => self.ty_from_ast(&t, &mut generics, None),
                    None => self.ctx.fresh(),
                };
                Some((fname, ty))
            })
            .collect();
        let derives = self.validate_derives(
            s.deriving(),
            &name,
            !generics.is_empty(),
            DEFAULT_STRUCT_DERIVES,
            Self::span_of(s.syntax()),
        );
        let info = StructDefInfo {
            name: name.clone(),
            fields,
            derives: derives.clone(),
            is_pub: s.visibility().is_some(),
        };
        self.register_derive_impls(&Ty::Con(name.clone()), &derives);
        self.registry.struct_defs.insert(name, info);
    }

    fn collect_sum_type(&mut self, t: &ast::SumTypeDef) {
        let Some(name) = t.name().map(|n| n.text()) else {
            return;
        };
        if builtins::is_builtin_sum_type(&name) || self.registry.sum_type_defs.contains_key(&name)
        {
            self.error(TypeError::DuplicateDefinition {
                name: name.clone(),
                span: Self::span_of(t.syntax()),
            });
            return;
        }
        let mut generics = FxHashMap::default();
        let variants: Vec<VariantInfo> = t
            .variants()
            .enumerate()
            .filter_map(|(tag, v)| {
                let vname = v.name()?.text();
                let fields = v
                    .field_types()
                    .map(|ft| self.ty_from_ast(&ft, &mut generics, None))
                    .collect();
                Some(VariantInfo {
                    name: vname,
                    fields,
                    tag: tag as u8,
                })
            })
            .collect();
        let derives = self.validate_derives(
            t.deriving(),
            &name,
            !generics.is_empty(),
            DEFAULT_SUM_DERIVES,
            Self::span_of(t.syntax()),
        );
        self.register_derive_impls(&Ty::Con(name.clone()), &derives);

        // Bare variant constructors are in scope within the module.
        let result = Ty::Con(name.clone());
        for v in &variants {
            let ty = if v.fields.is_empty() {
                result.clone()
            } else {
                Ty::Fun(v.fields.clone(), Box::new(result.clone()))
            };
            self.env.insert(v.name.clone(), Scheme::mono(ty));
        }

        self.registry.sum_type_defs.insert(
            name.clone(),
            SumTypeDefInfo {
                name,
                variants,
                derives,
                is_pub: t.visibility().is_some(),
            },
        );
    }

    /// Validate a deriving clause. No clause means the default set; an
    /// empty clause derives nothing.
    fn validate_derives(
        &mut self,
        clause: Option<ast::DerivingClause>,
        type_name: &str,
        is_generic: bool,
        default_set: &[&str],
        span: Span,
    ) -> Vec<String> {
        let requested: Vec<String> = match &clause {
            Some(c) => c.traits(),
            None => default_set.iter().map(|s| s.to_string()).collect(),
        };
        if clause.is_some() && is_generic && !requested.is_empty() {
            self.error(TypeError::GenericDerive {
                type_name: type_name.to_string(),
                span,
            });
            return Vec::new();
        }
        if is_generic {
            return Vec::new();
        }
        let mut derives = Vec::new();
        for name in requested {
            if DERIVABLE.contains(&name.as_str()) {
                if !derives.contains(&name) {
                    derives.push(name);
                }
            } else {
                self.error(TypeError::UnsupportedDerive { name, span });
            }
        }
        derives
    }

    /// Register trait impls for exactly the derived traits.
    fn register_derive_impls(&mut self, ty: &Ty, derives: &[String]) {
        for trait_name in derives {
            let (method, param_count, ret) = match trait_name.as_str() {
                "Eq" => ("eq", 2, Ty::bool()),
                "Ord" => ("compare", 2, Ty::Con("Ordering".into())),
                "Debug" => ("inspect", 1, Ty::string()),
                "Display" => ("to_string", 1, Ty::string()),
                "Hash" => ("hash", 1, Ty::int()),
                _ => continue,
            };
            let mut methods = FxHashMap::default();
            methods.insert(
                method.to_string(),
                ImplMethodSig {
                    param_count,
                    return_type: ret,
                },
            );
            self.traits.add_impl(TraitImplDef {
                trait_name: trait_name.clone(),
                impl_type: ty.clone(),
                methods,
                assoc_bindings: FxHashMap::default(),
            });
        }
    }

    fn collect_interfaces(&mut self, items: &[Item]) {
        for item in items {
            let Item::InterfaceDef(iface) = item else {
                continue;
            };
            let Some(name) = iface.name().map(|n| n.text()) else {
                continue;
            };
            let assoc_types: Vec<String> = iface
                .assoc_types()
                .filter_map(|a| a.name().map(|n| n.text()))
                .collect();
            let mut methods = Vec::new();
            for m in iface.methods() {
                let Some(mname) = m.name().map(|n| n.text()) else {
                    continue;
                };
                let mut generics = FxHashMap::default();
                let mut params = Vec::new();
                let mut has_self = false;
                if let Some(pl) = m.param_list() {
                    for p in pl.params() {
                        if p.is_self() {
                            has_self = true;
                            params.push(Ty::Con("Self".into()));
                        } else {
                            let ty = match p.ty() {
                                Some(t) => {
                                    self.ty_from_ast_placeholder(&t, &mut generics)
                                }
                                None => self.ctx.fresh(),
                            };
                            params.push(ty);
                        }
                    }
                }
                let ret = match m.return_type().and_then(|r| r.ty()) {
                    Some(t) => self.ty_from_ast_placeholder(&t, &mut generics),
                    None => Ty::unit(),
                };
                if m.default_body().is_some() {
                    self.default_method_bodies
                        .insert((name.clone(), mname.clone()), m.syntax().text_range());
                }
                methods.push(TraitMethodSig {
                    name: mname,
                    params,
                    ret,
                    has_self,
                });
            }
            self.traits.define_trait(TraitDef {
                name,
                methods,
                assoc_types,
                is_pub: iface.visibility().is_some(),
            });
        }
    }

    fn collect_impl_headers(&mut self, items: &[Item]) {
        for item in items {
            let Item::ImplDef(impl_def) = item else {
                continue;
            };
            let Some(trait_name) = impl_def.trait_path().map(|p| p.dotted()) else {
                continue;
            };
            let Some(type_name) = impl_def.type_path().map(|p| p.dotted()) else {
                continue;
            };
            let impl_ty = self.named_type(&type_name);

            let mut assoc_bindings = FxHashMap::default();
            for binding in impl_def.assoc_bindings() {
                if let (Some(bname), Some(bty)) = (binding.name(), binding.ty()) {
                    let mut generics = FxHashMap::default();
                    let ty = self.ty_from_ast(&bty, &mut generics, None);
                    assoc_bindings.insert(bname.text(), ty);
                }
            }

            let self_ctx = SelfCtx {
                ty: impl_ty.clone(),
                assoc: assoc_bindings.clone(),
            };
            let mut methods = FxHashMap::default();
            for m in impl_def.methods() {
                let Some(mname) = m.name().map(|n| n.text()) else {
                    continue;
                };
                let param_count = m
                    .param_list()
                    .map(|pl| pl.params().count())
                    .unwrap_or(0);
                let mut generics = FxHashMap::default();
                let return_type = match m.return_type().and_then(|r| r.ty()) {
                    Some(t) => self.ty_from_ast(&t, &mut generics, Some(&self_ctx)),
                    None => Ty::unit(),
                };
                methods.insert(
                    mname,
                    ImplMethodSig {
                        param_count,
                        return_type,
                    },
                );
            }

            self.traits.add_impl(TraitImplDef {
                trait_name,
                impl_type: impl_ty,
                methods,
                assoc_bindings,
            });
        }
    }

    // ── Imports ─────────────────────────────────────────────────────────

    fn process_imports(&mut self, items: &[Item]) {
        for item in items {
            match item {
                Item::ImportDecl(decl) => {
                    let Some(path) = decl.module_path() else {
                        continue;
                    };
                    let full = path.dotted();
                    let alias = path.segments().last().cloned().unwrap_or_default();
                    // Unknown plain imports are left for use sites; they
                    // may name stdlib modules.
                    self.qualified_modules.insert(alias, full);
                }
                Item::FromImportDecl(decl) => self.process_from_import(decl),
                _ => {}
            }
        }
    }

    fn process_from_import(&mut self, decl: &ast::FromImportDecl) {
        let Some(path) = decl.module_path() else {
            return;
        };
        let module_name = path.dotted();
        let span: Span = path.syntax().text_range().into();
        let Some(exports) = self.import_ctx.modules.get(&module_name).cloned() else {
            self.error(TypeError::UnresolvedImport { module_name, span });
            return;
        };

        for name_ref in decl.names() {
            let name = name_ref.text();
            let span: Span = name_ref.syntax().text_range().into();
            if let Some(scheme) = exports.functions.get(&name) {
                self.env.insert(name.clone(), scheme.clone());
                self.imported_functions.push(name);
            } else if let Some(def) = exports.struct_defs.get(&name) {
                self.registry.struct_defs.insert(name.clone(), def.clone());
            } else if let Some(def) = exports.sum_type_defs.get(&name) {
                let result = Ty::Con(def.name.clone());
                for v in &def.variants {
                    let ty = if v.fields.is_empty() {
                        result.clone()
                    } else {
                        Ty::Fun(v.fields.clone(), Box::new(result.clone()))
                    };
                    self.env.insert(v.name.clone(), Scheme::mono(ty));
                }
                self.registry.sum_type_defs.insert(name.clone(), def.clone());
            } else if exports.trait_defs.iter().any(|t| t.name == name) {
                // Trait defs are already merged globally; importing the
                // name is a no-op that keeps the source self-describing.
            } else if exports.private_names.contains(&name) {
                self.error(TypeError::PrivateItem {
                    module_name: module_name.clone(),
                    name,
                    span,
                });
            } else {
                let candidates = exports
                    .functions
                    .keys()
                    .chain(exports.struct_defs.keys())
                    .chain(exports.sum_type_defs.keys())
                    .cloned()
                    .collect();
                self.error(TypeError::ImportNameNotFound {
                    module_name: module_name.clone(),
                    name,
                    span,
                    candidates,
                });
            }
        }
    }

    // ── Function signatures and bodies ──────────────────────────────────

    fn fn_signature(&mut self, f: &ast::FnDef, self_ctx: Option<&SelfCtx>) -> (Vec<Ty>, Ty) {
        let mut generics = FxHashMap::default();
        let mut params = Vec::new();
        if let Some(pl) = f.param_list() {
            for p in pl.params() {
                if p.is_self() {
                    let ty = self_ctx
                        .map(|s| s.ty.clone())
                        .unwrap_or_else(|| self.ctx.fresh());
                    params.push(ty);
                } else {
                    let ty = match p.ty() {
                        Some(t) => self.ty_from_ast(&t, &mut generics, self_ctx),
                        None => self.ctx.fresh(),
                    };
                    params.push(ty);
                }
            }
        }
        let ret = match f.return_type().and_then(|r| r.ty()) {
            Some(t) => self.ty_from_ast(&t, &mut generics, self_ctx),
            None => self.ctx.fresh(),
        };
        (params, ret)
    }

    fn register_fn_signatures(&mut self, items: &[Item]) {
        for item in items {
            let Item::FnDef(f) = item else {
                continue;
            };
            let Some(name) = f.name().map(|n| n.text()) else {
                continue;
            };
            let (params, ret) = self.fn_signature(f, None);
            let ty = Ty::Fun(params, Box::new(ret));
            self.record(f.syntax(), &ty);
            self.env.insert(name, Scheme::mono(ty));
        }
    }

    fn check_fn_body(&mut self, f: &ast::FnDef, self_ctx: Option<&SelfCtx>) {
        let Some(name) = f.name().map(|n| n.text()) else {
            return;
        };
        let fn_ty = match self.env.lookup(&name) {
            Some(scheme) if self_ctx.is_none() => self.ctx.instantiate(scheme),
            _ => {
                let (params, ret) = self.fn_signature(f, self_ctx);
                Ty::Fun(params, Box::new(ret))
            }
        };
        let Ty::Fun(param_tys, ret_ty) = fn_ty.clone() else {
            return;
        };

        self.env.push_scope();
        if let Some(pl) = f.param_list() {
            for (p, ty) in pl.params().zip(&param_tys) {
                let pname = if p.is_self() {
                    "self".to_string()
                } else {
                    match p.name() {
                        Some(n) => n.text(),
                        None => continue,
                    }
                };
                self.record(p.syntax(), ty);
                self.env.insert(pname, Scheme::mono(ty.clone()));
            }
        }
        self.return_stack.push((*ret_ty).clone());
        if let Some(body) = f.body() {
            let body_ty = self.infer_block(&body);
            let span = body
                .tail_expr()
                .map(|e| Self::span_of(e.syntax()))
                .unwrap_or_else(|| Self::span_of(f.syntax()));
            self.unify_or_report(&ret_ty, &body_ty, span);
        }
        self.return_stack.pop();
        self.env.pop_scope();

        if self_ctx.is_none() {
            // Re-bind with the inferred, generalized scheme so later
            // modules and exports see the polymorphic type. The recursive
            // mono binding must leave the env first or its variables
            // would never quantify.
            self.env.remove(&name);
            let scheme = self.ctx.generalize(&self.env, &fn_ty);
            self.record(f.syntax(), &fn_ty);
            self.fn_schemes.insert(name.clone(), scheme.clone());
            self.env.insert(name, scheme);
        }
    }

    fn check_impl_bodies(&mut self, impl_def: &ast::ImplDef) {
        let Some(type_name) = impl_def.type_path().map(|p| p.dotted()) else {
            return;
        };
        let impl_ty = self.named_type(&type_name);
        let mut assoc = FxHashMap::default();
        for binding in impl_def.assoc_bindings() {
            if let (Some(bname), Some(bty)) = (binding.name(), binding.ty()) {
                let mut generics = FxHashMap::default();
                let ty = self.ty_from_ast(&bty, &mut generics, None);
                assoc.insert(bname.text(), ty);
            }
        }
        let self_ctx = SelfCtx { ty: impl_ty, assoc };
        for m in impl_def.methods() {
            self.check_fn_body(&m, Some(&self_ctx));
        }
    }

    fn infer_let(&mut self, l: &ast::LetStmt) -> Ty {
        let value_ty = match l.value() {
            Some(v) => self.infer_expr(&v),
            None => self.ctx.fresh(),
        };
        if let Some(name) = l.name() {
            // Let-polymorphism: generalize the binding.
            let scheme = self.ctx.generalize(&self.env, &value_ty);
            self.record(name.syntax(), &value_ty);
            self.env.insert(name.text(), scheme);
        }
        self.record(l.syntax(), &Ty::unit());
        Ty::unit()
    }

    fn infer_block(&mut self, block: &ast::Block) -> Ty {
        let mut last = Ty::unit();
        for stmt in block.stmts() {
            last = match stmt {
                Stmt::Let(l) => self.infer_let(&l),
                Stmt::Expr(e) => self.infer_expr(&e),
            };
        }
        self.record(block.syntax(), &last);
        last
    }

    // ── Expression inference ────────────────────────────────────────────

    fn infer_expr(&mut self, expr: &Expr) -> Ty {
        let ty = self.infer_expr_inner(expr);
        self.record(expr.syntax(), &ty);
        ty
    }

    fn infer_expr_inner(&mut self, expr: &Expr) -> Ty {
        match expr {
            Expr::Literal(lit) => match lit.kind() {
                Some(ast::LiteralKind::Int(_)) => Ty::int(),
                Some(ast::LiteralKind::Float(_)) => Ty::float(),
                Some(ast::LiteralKind::Bool(_)) => Ty::bool(),
                None => self.ctx.fresh(),
            },
            Expr::StringExpr(s) => self.infer_string(s),
            Expr::NameRef(name_ref) => self.infer_name_ref(name_ref),
            Expr::BinaryExpr(b) => self.infer_binary(b),
            Expr::UnaryExpr(u) => self.infer_unary(u),
            Expr::CallExpr(call) => self.infer_call(call),
            Expr::FieldAccess(fa) => match self.lookup_field(fa) {
                FieldLookup::Found(ty) => ty,
                FieldLookup::NoSuchField { base_ty } => {
                    let field = fa
                        .field_name()
                        .map(|n| n.text())
                        .unwrap_or_default();
                    self.error(TypeError::NoSuchField {
                        ty: base_ty,
                        field,
                        span: Self::span_of(fa.syntax()),
                    });
                    self.ctx.fresh()
                }
                FieldLookup::Reported => self.ctx.fresh(),
            },
            Expr::ParenExpr(p) => match p.expr() {
                Some(inner) => self.infer_expr(&inner),
                None => self.ctx.fresh(),
            },
            Expr::TupleExpr(t) => {
                let items: Vec<Ty> = t.items().map(|e| self.infer_expr(&e)).collect();
                Ty::Tuple(items)
            }
            Expr::ListExpr(l) => {
                let elem = self.ctx.fresh();
                for item in l.items() {
                    let ty = self.infer_expr(&item);
                    self.unify_or_report(&elem, &ty, Self::span_of(item.syntax()));
                }
                Ty::list(elem)
            }
            Expr::IfExpr(i) => self.infer_if(i),
            Expr::CaseExpr(c) => self.infer_case(c),
            Expr::ForExpr(f) => self.infer_for(f),
            Expr::LambdaExpr(l) => self.infer_lambda(l),
            Expr::ReceiveExpr(r) => self.infer_receive(r),
            Expr::SpawnExpr(s) => self.infer_spawn(s),
            Expr::SendExpr(s) => self.infer_send(s),
            Expr::ReturnExpr(r) => {
                let value_ty = match r.expr() {
                    Some(e) => self.infer_expr(&e),
                    None => Ty::unit(),
                };
                if let Some(ret) = self.return_stack.last().cloned() {
                    self.unify_or_report(&ret, &value_ty, Self::span_of(r.syntax()));
                }
                self.ctx.fresh()
            }
            Expr::TryExpr(t) => self.infer_try(t),
            Expr::StructLit(s) => self.infer_struct_lit(s),
        }
    }

    fn infer_string(&mut self, s: &ast::StringExpr) -> Ty {
        for seg in s.segments() {
            if let ast::StringSegment::Interpolation(interp) = seg {
                if let Some(e) = interp.expr() {
                    let ty = self.infer_expr(&e);
                    let resolved = self.ctx.resolve(&ty);
                    // Interpolated values render through Display dispatch.
                    if !matches!(resolved, Ty::Var(_))
                        && self
                            .traits
                            .find_method_traits("to_string", &resolved, &mut self.ctx)
                            .is_empty()
                    {
                        self.error(TypeError::NoSuchMethod {
                            ty: resolved,
                            method_name: "to_string".to_string(),
                            span: Self::span_of(e.syntax()),
                        });
                    }
                }
            }
        }
        Ty::string()
    }

    fn infer_name_ref(&mut self, name_ref: &ast::NameRef) -> Ty {
        let name = name_ref.text();
        if let Some(scheme) = self.env.lookup(&name) {
            let scheme = scheme.clone();
            return self.ctx.instantiate(&scheme);
        }
        let candidates = self.env.names();
        self.error(TypeError::UnknownName {
            name,
            span: Self::span_of(name_ref.syntax()),
            candidates,
        });
        self.ctx.fresh()
    }

    fn infer_binary(&mut self, b: &ast::BinaryExpr) -> Ty {
        use mesh_parser::SyntaxKind::*;
        let op = b.op_kind();
        let lhs_ty = match b.lhs() {
            Some(l) => self.infer_expr(&l),
            None => self.ctx.fresh(),
        };
        let span = Self::span_of(b.syntax());

        // `a |> f` pipes the left value into the callable on the right.
        if op == Some(PIPE_GT) {
            let rhs_ty = match b.rhs() {
                Some(r) => self.infer_expr(&r),
                None => self.ctx.fresh(),
            };
            let out = self.ctx.fresh();
            self.unify_or_report(
                &Ty::Fun(vec![lhs_ty], Box::new(out.clone())),
                &rhs_ty,
                span,
            );
            return out;
        }

        let rhs_ty = match b.rhs() {
            Some(r) => self.infer_expr(&r),
            None => self.ctx.fresh(),
        };

        match op {
            Some(PLUS | MINUS | STAR | SLASH) => {
                // Operator desugaring: `a + b` is the Add interface call;
                // the result is the impl's Output associated type.
                let trait_name = match op {
                    Some(PLUS) => "Add",
                    Some(MINUS) => "Sub",
                    Some(STAR) => "Mul",
                    _ => "Div",
                };
                self.unify_or_report(&lhs_ty, &rhs_ty, span);
                let resolved = self.ctx.resolve(&lhs_ty);
                match resolved {
                    Ty::Var(_) => {
                        // Unconstrained operands default to Int.
                        self.unify_or_report(&lhs_ty, &Ty::int(), span);
                        Ty::int()
                    }
                    ref t => {
                        if let Some(out) = self.traits.lookup_assoc(trait_name, t, "Output") {
                            out
                        } else {
                            self.error(TypeError::NoSuchMethod {
                                ty: resolved,
                                method_name: trait_name.to_lowercase(),
                                span,
                            });
                            self.ctx.fresh()
                        }
                    }
                }
            }
            Some(PERCENT) => {
                self.unify_or_report(&lhs_ty, &Ty::int(), span);
                self.unify_or_report(&rhs_ty, &Ty::int(), span);
                Ty::int()
            }
            Some(PLUS_PLUS) => {
                self.unify_or_report(&lhs_ty, &rhs_ty, span);
                let resolved = self.ctx.resolve(&lhs_ty);
                match &resolved {
                    Ty::Var(_) => {
                        self.unify_or_report(&lhs_ty, &Ty::string(), span);
                        Ty::string()
                    }
                    Ty::Con(n) if n == "String" => Ty::string(),
                    Ty::App(n, _) if n == "List" => resolved.clone(),
                    _ => {
                        self.error(TypeError::TypeMismatch {
                            expected: Ty::string(),
                            found: resolved,
                            span,
                        });
                        self.ctx.fresh()
                    }
                }
            }
            Some(EQ_EQ | NOT_EQ | LT | GT | LT_EQ | GT_EQ) => {
                self.unify_or_report(&lhs_ty, &rhs_ty, span);
                Ty::bool()
            }
            Some(AND_KW | OR_KW) => {
                self.unify_or_report(&lhs_ty, &Ty::bool(), span);
                self.unify_or_report(&rhs_ty, &Ty::bool(), span);
                Ty::bool()
            }
            _ => self.ctx.fresh(),
        }
    }

    fn infer_unary(&mut self, u: &ast::UnaryExpr) -> Ty {
        use mesh_parser::SyntaxKind::*;
        let operand_ty = match u.operand() {
            Some(o) => self.infer_expr(&o),
            None => self.ctx.fresh(),
        };
        let span = Self::span_of(u.syntax());
        match u.op_kind() {
            Some(NOT_KW) => {
                self.unify_or_report(&operand_ty, &Ty::bool(), span);
                Ty::bool()
            }
            _ => {
                // Negation goes through the Neg interface.
                let resolved = self.ctx.resolve(&operand_ty);
                match resolved {
                    Ty::Var(_) => {
                        self.unify_or_report(&operand_ty, &Ty::int(), span);
                        Ty::int()
                    }
                    ref t => self.traits.lookup_assoc("Neg", t, "Output").unwrap_or_else(|| {
                        self.error(TypeError::NoSuchMethod {
                            ty: resolved.clone(),
                            method_name: "neg".to_string(),
                            span,
                        });
                        self.ctx.fresh()
                    }),
                }
            }
        }
    }

    fn infer_if(&mut self, i: &ast::IfExpr) -> Ty {
        if let Some(cond) = i.condition() {
            let cond_ty = self.infer_expr(&cond);
            self.unify_or_report(&Ty::bool(), &cond_ty, Self::span_of(cond.syntax()));
        }
        let then_ty = match i.then_block() {
            Some(b) => {
                self.env.push_scope();
                let t = self.infer_block(&b);
                self.env.pop_scope();
                t
            }
            None => Ty::unit(),
        };
        match i.else_block() {
            Some(b) => {
                self.env.push_scope();
                let else_ty = self.infer_block(&b);
                self.env.pop_scope();
                self.unify_or_report(&then_ty, &else_ty, Self::span_of(b.syntax()));
                then_ty
            }
            None => Ty::unit(),
        }
    }

    fn infer_case(&mut self, c: &ast::CaseExpr) -> Ty {
        let scrutinee_ty = match c.scrutinee() {
            Some(s) => self.infer_expr(&s),
            None => self.ctx.fresh(),
        };
        let result = self.ctx.fresh();
        let mut arm_pats = Vec::new();
        for arm in c.arms() {
            self.env.push_scope();
            if let Some(pat) = arm.pattern() {
                self.check_pattern(&pat, &scrutinee_ty);
                arm_pats.push(ArmPat {
                    pat: self.simple_pat(&pat),
                    guarded: arm.guard().is_some(),
                });
            }
            if let Some(guard) = arm.guard() {
                if let Some(cond) = guard.condition() {
                    let ty = self.infer_expr(&cond);
                    self.unify_or_report(&Ty::bool(), &ty, Self::span_of(cond.syntax()));
                }
            }
            if let Some(body) = arm.body() {
                let ty = self.infer_expr(&body);
                self.unify_or_report(&result, &ty, Self::span_of(body.syntax()));
            }
            self.env.pop_scope();
        }

        let resolved = self.ctx.resolve(&scrutinee_ty);
        if let Err(missing) = exhaustiveness::check_match(&resolved, &arm_pats, &self.registry) {
            self.error(TypeError::NonExhaustiveMatch {
                ty: resolved,
                missing,
                span: Self::span_of(c.syntax()),
            });
        }
        result
    }

    fn infer_for(&mut self, f: &ast::ForExpr) -> Ty {
        let iter_ty = match f.iterable() {
            Some(it) => self.infer_expr(&it),
            None => self.ctx.fresh(),
        };
        let span = f
            .iterable()
            .map(|it| Self::span_of(it.syntax()))
            .unwrap_or_else(|| Self::span_of(f.syntax()));
        let resolved = self.ctx.resolve(&iter_ty);
        let elem_ty = match &resolved {
            Ty::App(n, args) if n == "List" || n == "Set" || n == "Iter" => args[0].clone(),
            Ty::App(n, args) if n == "Map" => {
                Ty::Tuple(vec![args[0].clone(), args[1].clone()])
            }
            Ty::Con(n) if n == "Range" => Ty::int(),
            Ty::Var(_) => {
                let elem = self.ctx.fresh();
                self.unify_or_report(&iter_ty, &Ty::list(elem.clone()), span);
                elem
            }
            other => {
                let expected_fresh = self.ctx.fresh();
                self.error(TypeError::TypeMismatch {
                    expected: Ty::list(expected_fresh),
                    found: other.clone(),
                    span,
                });
                self.ctx.fresh()
            }
        };

        self.env.push_scope();
        if let Some(binding) = f.binding() {
            self.record(binding.syntax(), &elem_ty);
            self.env.insert(binding.text(), Scheme::mono(elem_ty));
        }
        if let Some(filter) = f.filter() {
            if let Some(cond) = filter.condition() {
                // The filter must unify with Bool.
                let ty = self.infer_expr(&cond);
                self.unify_or_report(&Ty::bool(), &ty, Self::span_of(cond.syntax()));
            }
        }
        if let Some(body) = f.body() {
            self.infer_block(&body);
        }
        self.env.pop_scope();
        Ty::unit()
    }

    fn infer_lambda(&mut self, l: &ast::LambdaExpr) -> Ty {
        let mut generics = FxHashMap::default();
        let mut param_tys = Vec::new();
        self.env.push_scope();
        for p in l.params() {
            let ty = match p.ty() {
                Some(t) => self.ty_from_ast(&t, &mut generics, None),
                None => self.ctx.fresh(),
            };
            if let Some(name) = p.name() {
                self.record(p.syntax(), &ty);
                self.env.insert(name.text(), Scheme::mono(ty.clone()));
            }
            param_tys.push(ty);
        }
        let ret = self.ctx.fresh();
        self.return_stack.push(ret.clone());
        if let Some(body) = l.body() {
            let body_ty = self.infer_block(&body);
            self.unify_or_report(&ret, &body_ty, Self::span_of(body.syntax()));
        }
        self.return_stack.pop();
        self.env.pop_scope();
        Ty::Fun(param_tys, Box::new(ret))
    }

    fn infer_receive(&mut self, r: &ast::ReceiveExpr) -> Ty {
        let result = self.ctx.fresh();
        for arm in r.arms() {
            self.env.push_scope();
            // Mailboxes are untyped: each arm matches its own shape.
            let msg_ty = self.ctx.fresh();
            if let Some(pat) = arm.pattern() {
                self.check_pattern(&pat, &msg_ty);
            }
            if let Some(guard) = arm.guard() {
                if let Some(cond) = guard.condition() {
                    let ty = self.infer_expr(&cond);
                    self.unify_or_report(&Ty::bool(), &ty, Self::span_of(cond.syntax()));
                }
            }
            if let Some(body) = arm.body() {
                let ty = self.infer_expr(&body);
                self.unify_or_report(&result, &ty, Self::span_of(body.syntax()));
            }
            self.env.pop_scope();
        }
        if let Some(after) = r.after() {
            if let Some(timeout) = after.timeout() {
                let ty = self.infer_expr(&timeout);
                self.unify_or_report(&Ty::int(), &ty, Self::span_of(timeout.syntax()));
            }
            if let Some(body) = after.body() {
                let ty = self.infer_expr(&body);
                self.unify_or_report(&result, &ty, Self::span_of(body.syntax()));
            }
        }
        result
    }

    fn infer_spawn(&mut self, s: &ast::SpawnExpr) -> Ty {
        let args: Vec<Expr> = s
            .arg_list()
            .map(|al| al.args().collect())
            .unwrap_or_default();
        let span = Self::span_of(s.syntax());
        if args.is_empty() {
            self.error(TypeError::ArityMismatch {
                expected: 1,
                found: 0,
                span,
            });
            return Ty::pid();
        }
        let fn_ty = self.infer_expr(&args[0]);
        let arg_tys: Vec<Ty> = args[1..].iter().map(|a| self.infer_expr(a)).collect();
        let ret = self.ctx.fresh();
        self.unify_or_report(&fn_ty, &Ty::Fun(arg_tys, Box::new(ret)), span);
        Ty::pid()
    }

    fn infer_send(&mut self, s: &ast::SendExpr) -> Ty {
        let args: Vec<Expr> = s
            .arg_list()
            .map(|al| al.args().collect())
            .unwrap_or_default();
        let span = Self::span_of(s.syntax());
        if args.len() != 2 {
            self.error(TypeError::ArityMismatch {
                expected: 2,
                found: args.len(),
                span,
            });
        }
        if let Some(target) = args.first() {
            let ty = self.infer_expr(target);
            self.unify_or_report(&Ty::pid(), &ty, Self::span_of(target.syntax()));
        }
        if let Some(msg) = args.get(1) {
            self.infer_expr(msg);
        }
        Ty::unit()
    }

    fn infer_try(&mut self, t: &ast::TryExpr) -> Ty {
        let inner = match t.expr() {
            Some(e) => self.infer_expr(&e),
            None => self.ctx.fresh(),
        };
        let span = Self::span_of(t.syntax());
        let ok = self.ctx.fresh();
        let err = self.ctx.fresh();
        self.unify_or_report(&Ty::result(ok.clone(), err.clone()), &inner, span);

        // The enclosing function must return a Result; the Err variant
        // converts through From on propagation.
        if let Some(ret) = self.return_stack.last().cloned() {
            let ret_ok = self.ctx.fresh();
            let ret_err = self.ctx.fresh();
            self.unify_or_report(&Ty::result(ret_ok, ret_err.clone()), &ret, span);
            let from = self.ctx.resolve(&err);
            let into = self.ctx.resolve(&ret_err);
            if !matches!(from, Ty::Var(_)) && !matches!(into, Ty::Var(_)) && from != into {
                // A genuine conversion: require a From impl on the target.
                if !self.traits.has_impl("From", &into) {
                    self.error(TypeError::TypeMismatch {
                        expected: into,
                        found: from,
                        span,
                    });
                }
            } else {
                self.unify_or_report(&err, &ret_err, span);
            }
        }
        ok
    }

    fn infer_struct_lit(&mut self, s: &ast::StructLit) -> Ty {
        let Some(name) = s.type_name().map(|n| n.text()) else {
            return self.ctx.fresh();
        };
        let span = Self::span_of(s.syntax());
        let Some(def) = self.registry.struct_defs.get(&name).cloned() else {
            self.error(TypeError::UnknownType { name, span });
            return self.ctx.fresh();
        };

        // Refresh generic field variables per literal.
        let mut free = Vec::new();
        for (_, ty) in &def.fields {
            ty.free_vars(&mut free);
        }
        let mut mapping = FxHashMap::default();
        for v in free {
            mapping.insert(v, self.ctx.fresh());
        }

        let mut seen: Vec<String> = Vec::new();
        for field in s.fields() {
            let Some(fname) = field.name().map(|n| n.text()) else {
                continue;
            };
            let fspan: Span = field.syntax().text_range().into();
            match def.fields.iter().find(|(n, _)| *n == fname) {
                Some((_, fty)) => {
                    let expected = self.ctx.substitute(fty, &mapping);
                    if let Some(value) = field.value() {
                        let vty = self.infer_expr(&value);
                        self.unify_or_report(&expected, &vty, Self::span_of(value.syntax()));
                    }
                    seen.push(fname);
                }
                None => {
                    self.error(TypeError::NoSuchField {
                        ty: Ty::Con(def.name.clone()),
                        field: fname,
                        span: fspan,
                    });
                }
            }
        }
        for (fname, _) in &def.fields {
            if !seen.contains(fname) {
                self.error(TypeError::MissingField {
                    struct_name: def.name.clone(),
                    field: fname.clone(),
                    span,
                });
            }
        }
        Ty::Con(def.name)
    }

    // ── Calls and method resolution ─────────────────────────────────────

    fn infer_call(&mut self, call: &ast::CallExpr) -> Ty {
        let args: Vec<Expr> = call
            .arg_list()
            .map(|al| al.args().collect())
            .unwrap_or_default();
        let span = Self::span_of(call.syntax());

        let Some(callee) = call.callee() else {
            for a in &args {
                self.infer_expr(a);
            }
            return self.ctx.fresh();
        };

        match &callee {
            Expr::FieldAccess(fa) => {
                // First try normal field inference; only a NoSuchField
                // outcome switches to method-call mode. This keeps
                // `Shape.Circle(...)` and `Math.length(...)` working.
                match self.lookup_field(fa) {
                    FieldLookup::Found(fty) => {
                        self.record(fa.syntax(), &fty);
                        self.apply(fty, &args, span)
                    }
                    FieldLookup::Reported => {
                        for a in &args {
                            self.infer_expr(a);
                        }
                        self.ctx.fresh()
                    }
                    FieldLookup::NoSuchField { base_ty } => {
                        let method = fa
                            .field_name()
                            .map(|n| n.text())
                            .unwrap_or_default();
                        let ty = self.infer_method_call(fa, &base_ty, &method, &args, span);
                        self.record(fa.syntax(), &ty);
                        ty
                    }
                }
            }
            Expr::NameRef(name_ref) => {
                let name = name_ref.text();
                if self.env.lookup(&name).is_some() {
                    let fty = self.infer_expr(&callee);
                    self.apply(fty, &args, span)
                } else if self.trait_has_method(&name) {
                    // Bare-name trait call (`to_string(x)`): dispatch on
                    // the first argument, same as dot syntax.
                    let ty = self.infer_bare_trait_call(&name, &args, span);
                    self.record(callee.syntax(), &ty);
                    ty
                } else {
                    let fty = self.infer_expr(&callee);
                    self.apply(fty, &args, span)
                }
            }
            _ => {
                let fty = self.infer_expr(&callee);
                self.apply(fty, &args, span)
            }
        }
    }

    fn apply(&mut self, fn_ty: Ty, args: &[Expr], span: Span) -> Ty {
        let arg_tys: Vec<Ty> = args.iter().map(|a| self.infer_expr(a)).collect();
        let resolved = self.ctx.resolve(&fn_ty);
        match resolved {
            Ty::Fun(params, ret) => {
                if params.len() != arg_tys.len() {
                    self.error(TypeError::ArityMismatch {
                        expected: params.len(),
                        found: arg_tys.len(),
                        span,
                    });
                    return *ret;
                }
                for ((param, arg_ty), arg) in params.iter().zip(&arg_tys).zip(args) {
                    self.unify_or_report(param, arg_ty, Self::span_of(arg.syntax()));
                }
                *ret
            }
            Ty::Var(_) => {
                let ret = self.ctx.fresh();
                self.unify_or_report(
                    &resolved,
                    &Ty::Fun(arg_tys, Box::new(ret.clone())),
                    span,
                );
                ret
            }
            other => {
                self.error(TypeError::NotCallable { ty: other, span });
                self.ctx.fresh()
            }
        }
    }

    fn trait_has_method(&self, name: &str) -> bool {
        self.traits
            .all_impls()
            .iter()
            .any(|i| i.methods.contains_key(name))
    }

    fn infer_bare_trait_call(&mut self, method: &str, args: &[Expr], span: Span) -> Ty {
        if args.is_empty() {
            self.error(TypeError::UnknownName {
                name: method.to_string(),
                span,
                candidates: self.env.names(),
            });
            return self.ctx.fresh();
        }
        let recv_ty = self.infer_expr(&args[0]);
        let recv = self.ctx.resolve(&recv_ty);
        let rest: Vec<Expr> = args[1..].to_vec();
        self.dispatch_trait_method(&recv, method, &args[0], &rest, span)
    }

    /// Method-call mode for `x.m(...)` after field lookup failed, and for
    /// bare-name trait calls. Resolution order: unique trait impl, then
    /// the stdlib method table, then NoSuchMethod.
    fn infer_method_call(
        &mut self,
        fa: &ast::FieldAccess,
        base_ty: &Ty,
        method: &str,
        args: &[Expr],
        span: Span,
    ) -> Ty {
        let recv = self.ctx.resolve(base_ty);
        let Some(base) = fa.base() else {
            return self.ctx.fresh();
        };
        let rest: Vec<Expr> = args.to_vec();
        self.dispatch_trait_method(&recv, method, &base, &rest, span)
    }

    fn dispatch_trait_method(
        &mut self,
        recv: &Ty,
        method: &str,
        recv_expr: &Expr,
        args: &[Expr],
        span: Span,
    ) -> Ty {
        let matching = self.traits.find_method_traits(method, recv, &mut self.ctx);
        match matching.len() {
            1 => {
                let trait_name = &matching[0];
                let fn_ty = self.trait_method_fn_ty(trait_name, method, recv);
                let arg_tys: Vec<Ty> = args.iter().map(|a| self.infer_expr(a)).collect();
                let recv_ty = self
                    .types
                    .get(&recv_expr.syntax().text_range())
                    .cloned()
                    .unwrap_or_else(|| recv.clone());
                let mut all = vec![recv_ty];
                all.extend(arg_tys);
                let ret = self.ctx.fresh();
                self.unify_or_report(&fn_ty, &Ty::Fun(all, Box::new(ret.clone())), span);
                ret
            }
            0 => {
                // Stdlib module-owning types get a second chance through
                // their built-in method table.
                if let Some(head) = recv.head_name() {
                    let head = head.to_string();
                    let ty_args = match recv {
                        Ty::App(_, args) => args.clone(),
                        _ => Vec::new(),
                    };
                    if let Some(fn_ty) =
                        builtins::builtin_method(&head, method, &ty_args, &mut self.ctx)
                    {
                        let arg_tys: Vec<Ty> =
                            args.iter().map(|a| self.infer_expr(a)).collect();
                        let mut all = vec![recv.clone()];
                        all.extend(arg_tys);
                        let ret = self.ctx.fresh();
                        self.unify_or_report(
                            &fn_ty,
                            &Ty::Fun(all, Box::new(ret.clone())),
                            span,
                        );
                        return ret;
                    }
                }
                for a in args {
                    self.infer_expr(a);
                }
                self.error(TypeError::NoSuchMethod {
                    ty: recv.clone(),
                    method_name: method.to_string(),
                    span,
                });
                self.ctx.fresh()
            }
            _ => {
                for a in args {
                    self.infer_expr(a);
                }
                self.error(TypeError::AmbiguousMethod {
                    method_name: method.to_string(),
                    traits: matching,
                    span,
                });
                self.ctx.fresh()
            }
        }
    }

    /// Build `(Self, params...) -> Ret` for a trait method, substituting
    /// `Self` and `Self.Assoc` placeholders for the receiver type.
    fn trait_method_fn_ty(&mut self, trait_name: &str, method: &str, recv: &Ty) -> Ty {
        if let Some(def) = self.traits.get_trait(trait_name) {
            if let Some(sig) = def.methods.iter().find(|m| m.name == method).cloned() {
                let params: Vec<Ty> = sig
                    .params
                    .iter()
                    .map(|p| self.subst_self(p, trait_name, recv))
                    .collect();
                let ret = self.subst_self(&sig.ret, trait_name, recv);
                return Ty::Fun(params, Box::new(ret));
            }
        }
        // No trait definition (impl-only registration): fall back to the
        // impl's declared shape with fresh parameter types.
        if let Some((_, sig)) = self.traits.resolve_trait_method(method, recv, &mut self.ctx) {
            let mut params = vec![recv.clone()];
            for _ in 1..sig.param_count {
                params.push(self.ctx.fresh());
            }
            return Ty::Fun(params, Box::new(sig.return_type));
        }
        self.ctx.fresh()
    }

    fn subst_self(&mut self, ty: &Ty, trait_name: &str, recv: &Ty) -> Ty {
        match ty {
            Ty::Con(name) if name == "Self" => recv.clone(),
            Ty::Con(name) => {
                if let Some(assoc) = name.strip_prefix("Self.") {
                    self.traits
                        .lookup_assoc(trait_name, recv, assoc)
                        .unwrap_or_else(|| self.ctx.fresh())
                } else {
                    ty.clone()
                }
            }
            Ty::App(name, args) => {
                let args = args
                    .iter()
                    .map(|a| self.subst_self(a, trait_name, recv))
                    .collect();
                if name == "Self" {
                    recv.clone()
                } else {
                    Ty::App(name.clone(), args)
                }
            }
            Ty::Tuple(items) => Ty::Tuple(
                items
                    .iter()
                    .map(|t| self.subst_self(t, trait_name, recv))
                    .collect(),
            ),
            Ty::Fun(params, ret) => Ty::Fun(
                params
                    .iter()
                    .map(|p| self.subst_self(p, trait_name, recv))
                    .collect(),
                Box::new(self.subst_self(ret, trait_name, recv)),
            ),
            Ty::Var(_) => ty.clone(),
        }
    }

    // ── Field lookup ────────────────────────────────────────────────────

    fn lookup_field(&mut self, fa: &ast::FieldAccess) -> FieldLookup {
        let Some(field) = fa.field_name().map(|n| n.text()) else {
            return FieldLookup::Reported;
        };
        let Some(base) = fa.base() else {
            return FieldLookup::Reported;
        };

        // Module-qualified access and variant constructors resolve on the
        // NAME alone, without inferring the base as a value.
        if let Expr::NameRef(name_ref) = &base {
            let name = name_ref.text();
            if self.env.lookup(&name).is_none() {
                // Qualified module function: `Vector.add`.
                if let Some(full) = self.qualified_modules.get(&name).cloned() {
                    if let Some(exports) = self.import_ctx.modules.get(&full) {
                        if let Some(scheme) = exports.functions.get(&field).cloned() {
                            return FieldLookup::Found(self.ctx.instantiate(&scheme));
                        }
                        let candidates = exports.functions.keys().cloned().collect();
                        self.error(TypeError::ImportNameNotFound {
                            module_name: full,
                            name: field,
                            span: Self::span_of(fa.syntax()),
                            candidates,
                        });
                        return FieldLookup::Reported;
                    }
                }
                // Stdlib module: `Math.sqrt`.
                if builtins::is_stdlib_module(&name) {
                    if let Some(ty) = builtins::stdlib_module_fn(&name, &field, &mut self.ctx)
                    {
                        return FieldLookup::Found(ty);
                    }
                    self.error(TypeError::UnknownName {
                        name: format!("{name}.{field}"),
                        span: Self::span_of(fa.syntax()),
                        candidates: Vec::new(),
                    });
                    return FieldLookup::Reported;
                }
                // Sum-type variant constructor: `Shape.Circle`.
                if let Some(def) = self.registry.sum_type_defs.get(&name).cloned() {
                    return self.variant_ctor(&def, &field, fa);
                }
                if builtins::is_builtin_sum_type(&name) {
                    if let Some(scheme) = self.env.lookup(&field).cloned() {
                        return FieldLookup::Found(self.ctx.instantiate(&scheme));
                    }
                }
            }
        }

        // Plain struct field access on a value.
        let base_ty = self.infer_expr(&base);
        let resolved = self.ctx.resolve(&base_ty);
        if let Ty::Con(name) = &resolved {
            if let Some(def) = self.registry.struct_defs.get(name).cloned() {
                if let Some((_, fty)) = def.fields.iter().find(|(n, _)| *n == field) {
                    let mut free = Vec::new();
                    fty.free_vars(&mut free);
                    let mut mapping = FxHashMap::default();
                    for v in free {
                        mapping.insert(v, self.ctx.fresh());
                    }
                    let ty = self.ctx.substitute(fty, &mapping);
                    return FieldLookup::Found(ty);
                }
            }
        }
        FieldLookup::NoSuchField { base_ty: resolved }
    }

    fn variant_ctor(
        &mut self,
        def: &SumTypeDefInfo,
        variant: &str,
        fa: &ast::FieldAccess,
    ) -> FieldLookup {
        let result = Ty::Con(def.name.clone());
        match def.variants.iter().find(|v| v.name == variant) {
            Some(v) if v.fields.is_empty() => FieldLookup::Found(result),
            Some(v) => FieldLookup::Found(Ty::Fun(v.fields.clone(), Box::new(result))),
            None => {
                self.error(TypeError::NoSuchField {
                    ty: result,
                    field: variant.to_string(),
                    span: Self::span_of(fa.syntax()),
                });
                FieldLookup::Reported
            }
        }
    }

    // ── Patterns ────────────────────────────────────────────────────────

    fn check_pattern(&mut self, pat: &Pattern, expected: &Ty) {
        match pat {
            Pattern::Wildcard(_) => {}
            Pattern::Ident(ident) => {
                let Some(name) = ident.name().map(|n| n.text()) else {
                    return;
                };
                // An identifier naming a known nullary variant is a
                // constructor pattern, not a binding.
                let owner = self.registry.variant_owner(&name).cloned();
                if let Some(def) = owner {
                    let span = Self::span_of(ident.syntax());
                    self.unify_or_report(&Ty::Con(def.name.clone()), expected, span);
                    return;
                }
                if matches!(
                    name.as_str(),
                    "None" | "Less" | "Equal" | "Greater"
                ) {
                    if let Some(scheme) = self.env.lookup(&name).cloned() {
                        let ty = self.ctx.instantiate(&scheme);
                        let span = Self::span_of(ident.syntax());
                        self.unify_or_report(&ty, expected, span);
                        return;
                    }
                }
                self.record(ident.syntax(), expected);
                self.env.insert(name, Scheme::mono(expected.clone()));
            }
            Pattern::Literal(lit) => {
                let span = Self::span_of(lit.syntax());
                if lit.string().is_some() {
                    self.unify_or_report(&Ty::string(), expected, span);
                } else if let Some(l) = lit.literal() {
                    let ty = match l.kind() {
                        Some(ast::LiteralKind::Int(_)) => Ty::int(),
                        Some(ast::LiteralKind::Float(_)) => Ty::float(),
                        Some(ast::LiteralKind::Bool(_)) => Ty::bool(),
                        None => self.ctx.fresh(),
                    };
                    self.unify_or_report(&ty, expected, span);
                }
            }
            Pattern::Tuple(tuple) => {
                let items: Vec<Pattern> = tuple.items().collect();
                let item_tys: Vec<Ty> = items.iter().map(|_| self.ctx.fresh()).collect();
                let span = Self::span_of(tuple.syntax());
                self.unify_or_report(&Ty::Tuple(item_tys.clone()), expected, span);
                for (item, ty) in items.iter().zip(&item_tys) {
                    self.check_pattern(item, ty);
                }
            }
            Pattern::Constructor(ctor) => self.check_ctor_pattern(ctor, expected),
            Pattern::Or(or) => {
                for alt in or.alternatives() {
                    self.check_pattern(&alt, expected);
                }
            }
        }
    }

    fn check_ctor_pattern(&mut self, ctor: &ast::ConstructorPat, expected: &Ty) {
        let Some(path) = ctor.path() else {
            return;
        };
        let segments = path.segments();
        let span = Self::span_of(ctor.syntax());
        let args: Vec<Pattern> = ctor.args().collect();

        // `Type.Variant(...)` or bare `Variant(...)`.
        let (type_name, variant_name) = match segments.as_slice() {
            [t, v] => (Some(t.clone()), v.clone()),
            [v] => (None, v.clone()),
            _ => return,
        };

        // Builtin Option/Result constructors.
        if matches!(variant_name.as_str(), "Some" | "None" | "Ok" | "Err") {
            let inner = self.ctx.fresh();
            let other = self.ctx.fresh();
            let (container, field): (Ty, Option<Ty>) = match variant_name.as_str() {
                "Some" => (Ty::option(inner.clone()), Some(inner)),
                "None" => (Ty::option(inner), None),
                "Ok" => (Ty::result(inner.clone(), other), Some(inner)),
                _ => (Ty::result(other, inner.clone()), Some(inner)),
            };
            self.unify_or_report(&container, expected, span);
            if let (Some(fty), Some(arg)) = (field, args.first()) {
                self.check_pattern(arg, &fty);
            }
            return;
        }

        let def = match &type_name {
            Some(t) => self.registry.sum_type_defs.get(t).cloned(),
            None => self.registry.variant_owner(&variant_name).cloned(),
        };
        let Some(def) = def else {
            self.error(TypeError::UnknownType {
                name: type_name.unwrap_or_else(|| variant_name.clone()),
                span,
            });
            return;
        };
        self.unify_or_report(&Ty::Con(def.name.clone()), expected, span);
        let Some(variant) = def.variants.iter().find(|v| v.name == variant_name) else {
            self.error(TypeError::NoSuchField {
                ty: Ty::Con(def.name.clone()),
                field: variant_name,
                span,
            });
            return;
        };
        if variant.fields.len() != args.len() {
            self.error(TypeError::ArityMismatch {
                expected: variant.fields.len(),
                found: args.len(),
                span,
            });
        }
        for (arg, fty) in args.iter().zip(variant.fields.clone()) {
            self.check_pattern(arg, &fty);
        }
    }

    fn simple_pat(&self, pat: &Pattern) -> SimplePat {
        match pat {
            Pattern::Wildcard(_) => SimplePat::Irrefutable,
            Pattern::Ident(ident) => {
                let name = ident.name().map(|n| n.text()).unwrap_or_default();
                if self.registry.variant_owner(&name).is_some()
                    || matches!(name.as_str(), "None" | "Less" | "Equal" | "Greater")
                {
                    SimplePat::Ctor {
                        variant: name,
                        args: Vec::new(),
                    }
                } else {
                    SimplePat::Irrefutable
                }
            }
            Pattern::Literal(lit) => SimplePat::Literal(lit.syntax().text().to_string()),
            Pattern::Tuple(tuple) => {
                SimplePat::Tuple(tuple.items().map(|p| self.simple_pat(&p)).collect())
            }
            Pattern::Constructor(ctor) => {
                let variant = ctor
                    .path()
                    .map(|p| p.segments().last().cloned().unwrap_or_default())
                    .unwrap_or_default();
                SimplePat::Ctor {
                    variant,
                    args: ctor.args().map(|p| self.simple_pat(&p)).collect(),
                }
            }
            Pattern::Or(or) => {
                SimplePat::Or(or.alternatives().map(|p| self.simple_pat(&p)).collect())
            }
        }
    }

    // ── Type annotation lowering ────────────────────────────────────────

    fn named_type(&self, name: &str) -> Ty {
        Ty::Con(name.to_string())
    }

    /// Lower a type annotation. Lowercase names are type variables scoped
    /// to the enclosing item through `generics`.
    fn ty_from_ast(
        &mut self,
        ty: &TypeRef,
        generics: &mut FxHashMap<String, Ty>,
        self_ctx: Option<&SelfCtx>,
    ) -> Ty {
        match ty {
            TypeRef::Path(path_ty) => {
                let Some(path) = path_ty.path() else {
                    return self.ctx.fresh();
                };
                let segments = path.segments();
                let args: Vec<Ty> = path_ty
                    .type_args()
                    .map(|ta| {
                        ta.args()
                            .map(|a| self.ty_from_ast(&a, generics, self_ctx))
                            .collect()
                    })
                    .unwrap_or_default();
                match segments.as_slice() {
                    [one] if one == "Self" => match self_ctx {
                        Some(s) => s.ty.clone(),
                        None => Ty::Con("Self".into()),
                    },
                    [one] if one == "Unit" => Ty::unit(),
                    [one] => {
                        let first = one.chars().next().unwrap_or('_');
                        if first.is_lowercase() {
                            return generics
                                .entry(one.clone())
                                .or_insert_with(|| self.ctx.fresh())
                                .clone();
                        }
                        let known = builtins::BUILTIN_TYPES.contains(&one.as_str())
                            || self.registry.struct_defs.contains_key(one)
                            || self.registry.sum_type_defs.contains_key(one)
                            || self.traits.get_trait(one).is_some();
                        if !known {
                            self.error(TypeError::UnknownType {
                                name: one.clone(),
                                span: path.syntax().text_range().into(),
                            });
                        }
                        if args.is_empty() {
                            Ty::Con(one.clone())
                        } else {
                            Ty::App(one.clone(), args)
                        }
                    }
                    [head, assoc] if head == "Self" => match self_ctx {
                        Some(s) => s
                            .assoc
                            .get(assoc)
                            .cloned()
                            .unwrap_or_else(|| self.ctx.fresh()),
                        None => Ty::Con(format!("Self.{assoc}")),
                    },
                    [module, type_name] => {
                        // Qualified type from an imported module.
                        if let Some(full) = self.qualified_modules.get(module) {
                            if let Some(exports) = self.import_ctx.modules.get(full) {
                                if exports.struct_defs.contains_key(type_name)
                                    || exports.sum_type_defs.contains_key(type_name)
                                {
                                    return Ty::Con(type_name.clone());
                                }
                            }
                        }
                        self.error(TypeError::UnknownType {
                            name: segments.join("."),
                            span: path.syntax().text_range().into(),
                        });
                        self.ctx.fresh()
                    }
                    _ => self.ctx.fresh(),
                }
            }
            TypeRef::Tuple(tuple) => Ty::Tuple(
                tuple
                    .items()
                    .map(|t| self.ty_from_ast(&t, generics, self_ctx))
                    .collect(),
            ),
            TypeRef::Fn(fn_ty) => {
                let mut types: Vec<Ty> = fn_ty
                    .types()
                    .map(|t| self.ty_from_ast(&t, generics, self_ctx))
                    .collect();
                if fn_ty.has_arrow() && !types.is_empty() {
                    let ret = types.pop().unwrap();
                    Ty::Fun(types, Box::new(ret))
                } else {
                    Ty::Fun(types, Box::new(Ty::unit()))
                }
            }
        }
    }

    /// Lower an interface-signature annotation, keeping `Self` and
    /// `Self.Assoc` as placeholders for impl-time substitution.
    fn ty_from_ast_placeholder(
        &mut self,
        ty: &TypeRef,
        generics: &mut FxHashMap<String, Ty>,
    ) -> Ty {
        self.ty_from_ast(ty, generics, None)
    }
}

enum FieldLookup {
    Found(Ty),
    NoSuchField { base_ty: Ty },
    Reported,
}
