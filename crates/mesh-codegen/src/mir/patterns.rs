//! Pattern-match compilation.
//!
//! Matches compile to a decision chain: each arm contributes a test
//! (tag comparison, literal comparison, or nothing for irrefutable
//! patterns) plus binding extractions. String literal patterns compile
//! to chained `mesh_string_eq` calls returning i1. A match that reaches
//! the end without an irrefutable arm falls through to a panic, which
//! exhaustiveness checking has already ruled out for well-typed code.

use crate::mir::lower::{Lowerer, rt_call};
use crate::mir::{BinOp, MirExpr, MirLiteral, MirType};
use mesh_parser::ast::{self, AstNode, Pattern};
use mesh_typeck::ty::Ty;

/// One extracted binding: name, type, and the expression producing it.
type Binding = (String, MirType, MirExpr);

impl Lowerer<'_> {
    pub(crate) fn lower_case(&mut self, c: &ast::CaseExpr) -> MirExpr {
        let scrutinee_ast = c.scrutinee();
        let scrutinee_ty = scrutinee_ast
            .as_ref()
            .and_then(|s| self.ty_of_node(s.syntax()));
        let lowered = match &scrutinee_ast {
            Some(s) => self.lower_expr(s),
            None => MirExpr::Unit,
        };
        let tmp = self.fresh_temp("scrut");
        let tmp_ty = lowered.ty();
        self.push_scope();
        self.bind(&tmp, tmp_ty.clone());

        let arms: Vec<ast::CaseArm> = c.arms().collect();
        let result_ty = match self.ty_of_node(c.syntax()) {
            Some(t) => self.ty_to_mir(&t),
            None => MirType::Unit,
        };
        let scrutinee = MirExpr::Var(tmp.clone(), tmp_ty.clone());
        let dispatch = self.compile_arms(
            scrutinee,
            scrutinee_ty.as_ref(),
            &arms,
            result_ty.clone(),
            MirExpr::Panic {
                message: "unreachable match arm".into(),
            },
        );
        self.pop_scope();

        MirExpr::Block(
            vec![
                MirExpr::Let {
                    name: tmp,
                    ty: tmp_ty,
                    value: Box::new(lowered),
                },
                dispatch,
            ],
            result_ty,
        )
    }

    /// Fold arms right-to-left into an if-chain over `scrutinee`.
    pub(crate) fn compile_arms(
        &mut self,
        scrutinee: MirExpr,
        scrutinee_ty: Option<&Ty>,
        arms: &[ast::CaseArm],
        result_ty: MirType,
        fallback: MirExpr,
    ) -> MirExpr {
        let mut acc = fallback;
        for arm in arms.iter().rev() {
            let Some(pattern) = arm.pattern() else {
                continue;
            };
            self.push_scope();
            let (test, bindings) = self.pattern_test(&pattern, &scrutinee, scrutinee_ty);
            for (name, ty, _) in &bindings {
                self.bind(name, ty.clone());
            }
            let guard = arm
                .guard()
                .and_then(|g| g.condition())
                .map(|cond| self.lower_expr(&cond));
            let body = match arm.body() {
                Some(b) => self.lower_expr(&b),
                None => MirExpr::Unit,
            };
            self.pop_scope();

            let mut stmts: Vec<MirExpr> = bindings
                .into_iter()
                .map(|(name, ty, value)| MirExpr::Let {
                    name,
                    ty,
                    value: Box::new(value),
                })
                .collect();

            // Guards read pattern bindings, so the binding lets must run
            // before the guard. A guarded arm therefore nests: the
            // structural test gates the bindings, and the guard gates
            // the body, falling through to the remaining arms either
            // way.
            acc = match (test, guard) {
                (None, None) => {
                    // Irrefutable and unguarded: everything below this
                    // arm is dead.
                    stmts.push(body);
                    MirExpr::Block(stmts, result_ty.clone())
                }
                (Some(t), None) => {
                    stmts.push(body);
                    MirExpr::If {
                        cond: Box::new(t),
                        then_body: Box::new(MirExpr::Block(stmts, result_ty.clone())),
                        else_body: Box::new(acc),
                        ty: result_ty.clone(),
                    }
                }
                (test_opt, Some(g)) => {
                    let guarded = MirExpr::If {
                        cond: Box::new(g),
                        then_body: Box::new(body),
                        else_body: Box::new(acc.clone()),
                        ty: result_ty.clone(),
                    };
                    stmts.push(guarded);
                    let with_bindings = MirExpr::Block(stmts, result_ty.clone());
                    match test_opt {
                        Some(t) => MirExpr::If {
                            cond: Box::new(t),
                            then_body: Box::new(with_bindings),
                            else_body: Box::new(acc),
                            ty: result_ty.clone(),
                        },
                        None => with_bindings,
                    }
                }
            };
        }
        acc
    }

    /// Test + bindings for one pattern against `scrutinee`.
    fn pattern_test(
        &mut self,
        pattern: &Pattern,
        scrutinee: &MirExpr,
        scrutinee_ty: Option<&Ty>,
    ) -> (Option<MirExpr>, Vec<Binding>) {
        match pattern {
            Pattern::Wildcard(_) => (None, Vec::new()),
            Pattern::Ident(ident) => {
                let Some(name) = ident.name().map(|n| n.text()) else {
                    return (None, Vec::new());
                };
                // A nullary-variant name is a constructor test.
                if let Some(test) = self.nullary_variant_test(&name, scrutinee) {
                    return (Some(test), Vec::new());
                }
                let ty = scrutinee.ty();
                (None, vec![(name, ty, scrutinee.clone())])
            }
            Pattern::Literal(lit) => {
                if let Some(s) = lit.string() {
                    let text = s.as_plain_string().unwrap_or_default();
                    let test = rt_call(
                        "mesh_string_eq",
                        vec![
                            scrutinee.clone(),
                            MirExpr::Lit(MirLiteral::String(text), MirType::String),
                        ],
                        MirType::Bool,
                    );
                    return (Some(test), Vec::new());
                }
                let value = match lit.literal().and_then(|l| l.kind()) {
                    Some(ast::LiteralKind::Int(v)) => MirExpr::Lit(MirLiteral::Int(v), MirType::Int),
                    Some(ast::LiteralKind::Float(v)) => {
                        MirExpr::Lit(MirLiteral::Float(v), MirType::Float)
                    }
                    Some(ast::LiteralKind::Bool(v)) => {
                        MirExpr::Lit(MirLiteral::Bool(v), MirType::Bool)
                    }
                    None => MirExpr::Unit,
                };
                let test = MirExpr::BinOp {
                    op: BinOp::Eq,
                    lhs: Box::new(scrutinee.clone()),
                    rhs: Box::new(value),
                    ty: MirType::Bool,
                };
                (Some(test), Vec::new())
            }
            Pattern::Tuple(tuple) => {
                let mut conds: Vec<MirExpr> = Vec::new();
                let mut bindings = Vec::new();
                for (i, item) in tuple.items().enumerate() {
                    let elem_ty = match scrutinee.ty() {
                        MirType::Tuple(items) => {
                            items.get(i).cloned().unwrap_or(MirType::Int)
                        }
                        _ => MirType::Int,
                    };
                    let elem = MirExpr::TupleField {
                        object: Box::new(scrutinee.clone()),
                        index: i,
                        ty: elem_ty,
                    };
                    let elem_hm_ty = match scrutinee_ty {
                        Some(Ty::Tuple(items)) => items.get(i),
                        _ => None,
                    };
                    let (test, mut binds) = self.pattern_test(&item, &elem, elem_hm_ty);
                    if let Some(t) = test {
                        conds.push(t);
                    }
                    bindings.append(&mut binds);
                }
                (and_chain(conds), bindings)
            }
            Pattern::Constructor(ctor) => self.ctor_pattern_test(ctor, scrutinee),
            Pattern::Or(or) => {
                // Or-patterns bind nothing; alternatives OR their tests.
                let mut conds = Vec::new();
                for alt in or.alternatives() {
                    let (test, _) = self.pattern_test(&alt, scrutinee, scrutinee_ty);
                    if let Some(t) = test {
                        conds.push(t);
                    } else {
                        // An irrefutable alternative makes the whole
                        // or-pattern irrefutable.
                        return (None, Vec::new());
                    }
                }
                (or_chain(conds), Vec::new())
            }
        }
    }

    fn nullary_variant_test(&self, name: &str, scrutinee: &MirExpr) -> Option<MirExpr> {
        let (tag, boxed) = match name {
            "None" => (1, true),
            "Less" => (0, false),
            "Equal" => (1, false),
            "Greater" => (2, false),
            _ => {
                let def = self
                    .module
                    .sum_types
                    .iter()
                    .find(|d| d.variant(name).is_some_and(|v| v.fields.is_empty()))?;
                let v = def.variant(name)?;
                (v.tag as i64, !self.is_unboxed_sum(&def.name))
            }
        };
        let lhs = if boxed {
            MirExpr::GetTag {
                object: Box::new(scrutinee.clone()),
            }
        } else {
            scrutinee.clone()
        };
        Some(MirExpr::BinOp {
            op: BinOp::Eq,
            lhs: Box::new(lhs),
            rhs: Box::new(MirExpr::Lit(MirLiteral::Int(tag), MirType::Int)),
            ty: MirType::Bool,
        })
    }

    fn ctor_pattern_test(
        &mut self,
        ctor: &ast::ConstructorPat,
        scrutinee: &MirExpr,
    ) -> (Option<MirExpr>, Vec<Binding>) {
        let Some(path) = ctor.path() else {
            return (None, Vec::new());
        };
        let segments = path.segments();
        let variant_name = match segments.last() {
            Some(v) => v.clone(),
            None => return (None, Vec::new()),
        };
        let args: Vec<Pattern> = ctor.args().collect();

        // Builtin Option/Result payloads are a single erased slot.
        let (tag, field_tys): (i64, Vec<MirType>) = match variant_name.as_str() {
            "Some" => (0, vec![MirType::Int]),
            "None" => (1, vec![]),
            "Ok" => (0, vec![MirType::Int]),
            "Err" => (1, vec![MirType::Int]),
            _ => {
                let def = match segments.as_slice() {
                    [t, _] => self.module.sum_type_def(t).cloned(),
                    _ => self
                        .module
                        .sum_types
                        .iter()
                        .find(|d| d.variant(&variant_name).is_some())
                        .cloned(),
                };
                let Some(def) = def else {
                    return (None, Vec::new());
                };
                let Some(v) = def.variant(&variant_name) else {
                    return (None, Vec::new());
                };
                if self.is_unboxed_sum(&def.name) {
                    let test = MirExpr::BinOp {
                        op: BinOp::Eq,
                        lhs: Box::new(scrutinee.clone()),
                        rhs: Box::new(MirExpr::Lit(
                            MirLiteral::Int(v.tag as i64),
                            MirType::Int,
                        )),
                        ty: MirType::Bool,
                    };
                    return (Some(test), Vec::new());
                }
                (v.tag as i64, v.fields.clone())
            }
        };

        let mut conds = vec![MirExpr::BinOp {
            op: BinOp::Eq,
            lhs: Box::new(MirExpr::GetTag {
                object: Box::new(scrutinee.clone()),
            }),
            rhs: Box::new(MirExpr::Lit(MirLiteral::Int(tag), MirType::Int)),
            ty: MirType::Bool,
        }];
        let mut bindings = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            let fty = field_tys.get(i).cloned().unwrap_or(MirType::Int);
            let field = MirExpr::VariantField {
                object: Box::new(scrutinee.clone()),
                index: i,
                ty: fty,
            };
            let (test, mut binds) = self.pattern_test(arg, &field, None);
            if let Some(t) = test {
                conds.push(t);
            }
            bindings.append(&mut binds);
        }
        (and_chain(conds), bindings)
    }
}

fn and_chain(conds: Vec<MirExpr>) -> Option<MirExpr> {
    conds.into_iter().reduce(|acc, next| MirExpr::BinOp {
        op: BinOp::And,
        lhs: Box::new(acc),
        rhs: Box::new(next),
        ty: MirType::Bool,
    })
}

fn or_chain(conds: Vec<MirExpr>) -> Option<MirExpr> {
    conds.into_iter().reduce(|acc, next| MirExpr::BinOp {
        op: BinOp::Or,
        lhs: Box::new(acc),
        rhs: Box::new(next),
        ty: MirType::Bool,
    })
}
