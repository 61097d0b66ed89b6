//! Auto-derive synthesis: MIR bodies for Eq, Ord, Debug, Display, and
//! Hash on structs and sum types.
//!
//! Output formats:
//! - Display (struct): `StructName(field1, field2, ...)` positional.
//! - Debug (struct): `StructName { f1: v1, f2: v2 }` named.
//! - Display/Debug (sum): nullary variants print the bare name,
//!   non-nullary print `Variant(v0, v1, ...)`.
//! - Hash: FNV-1a over field hashes; sums hash the tag first.
//! - Eq/Ord: field-by-field lexicographic.

use crate::mir::lower::rt_call;
use crate::mir::{
    BinOp, MirExpr, MirFunction, MirLiteral, MirStructDef, MirSumTypeDef, MirType,
};
use mesh_typeck::TypeRegistry;

const FNV_OFFSET: i64 = 0xcbf29ce484222325_u64 as i64;
const FNV_PRIME: i64 = 0x0000_0100_0000_01b3_u64 as i64;

/// Ordering tag for Equal; Less = 0, Greater = 2.
const ORD_EQUAL: i64 = 1;

/// Generate derive method bodies for every derived trait on every type.
pub fn synthesize(
    structs: &[MirStructDef],
    sums: &[MirSumTypeDef],
    registry: &TypeRegistry,
) -> Vec<MirFunction> {
    let mut out = Vec::new();
    for def in structs {
        let Some(info) = registry.struct_defs.get(&def.name) else {
            continue;
        };
        for trait_name in &info.derives {
            if let Some(f) = derive_struct(trait_name, def) {
                out.push(f);
            }
        }
    }
    for def in sums {
        let Some(info) = registry.sum_type_defs.get(&def.name) else {
            continue;
        };
        let unboxed = def.variants.iter().all(|v| v.fields.is_empty());
        for trait_name in &info.derives {
            if let Some(f) = derive_sum(trait_name, def, unboxed) {
                out.push(f);
            }
        }
    }
    out
}

fn mangled(trait_name: &str, method: &str, type_name: &str) -> String {
    format!("{trait_name}__{method}__{type_name}")
}

fn lit_str(s: impl Into<String>) -> MirExpr {
    MirExpr::Lit(MirLiteral::String(s.into()), MirType::String)
}

fn lit_int(v: i64) -> MirExpr {
    MirExpr::Lit(MirLiteral::Int(v), MirType::Int)
}

fn concat(a: MirExpr, b: MirExpr) -> MirExpr {
    rt_call("mesh_string_concat", vec![a, b], MirType::String)
}

fn self_var(type_name: &str) -> MirExpr {
    MirExpr::Var("self".into(), MirType::Struct(type_name.into()))
}

fn other_var(type_name: &str) -> MirExpr {
    MirExpr::Var("other".into(), MirType::Struct(type_name.into()))
}

fn field(object: MirExpr, index: usize, ty: MirType) -> MirExpr {
    MirExpr::FieldAccess {
        object: Box::new(object),
        index,
        ty,
    }
}

/// Render one value as a Display string based on its MIR type.
fn display_of(value: MirExpr, ty: &MirType) -> MirExpr {
    match ty {
        MirType::String => value,
        MirType::Int | MirType::Unit => rt_call("mesh_int_to_string", vec![value], MirType::String),
        MirType::Float => rt_call("mesh_float_to_string", vec![value], MirType::String),
        MirType::Bool => rt_call("mesh_bool_to_string", vec![value], MirType::String),
        MirType::Struct(name) => MirExpr::Call {
            func: Box::new(MirExpr::Var(
                mangled("Display", "to_string", name),
                MirType::FnPtr(vec![ty.clone()], Box::new(MirType::String)),
            )),
            args: vec![value],
            ty: MirType::String,
        },
        // Erased heap values (lists, maps, closures, tuples) render as
        // an opaque handle.
        _ => rt_call("mesh_ptr_to_string", vec![value], MirType::String),
    }
}

/// Hash one value to an i64 based on its MIR type.
fn hash_of(value: MirExpr, ty: &MirType) -> MirExpr {
    match ty {
        MirType::Int | MirType::Bool | MirType::Unit => value,
        MirType::Float => rt_call("mesh_float_bits", vec![value], MirType::Int),
        MirType::String => rt_call("mesh_string_hash", vec![value], MirType::Int),
        MirType::Struct(name) => MirExpr::Call {
            func: Box::new(MirExpr::Var(
                mangled("Hash", "hash", name),
                MirType::FnPtr(vec![ty.clone()], Box::new(MirType::Int)),
            )),
            args: vec![value],
            ty: MirType::Int,
        },
        _ => value,
    }
}

/// Equality of one field pair based on its MIR type.
fn eq_of(a: MirExpr, b: MirExpr, ty: &MirType) -> MirExpr {
    match ty {
        MirType::String => rt_call("mesh_string_eq", vec![a, b], MirType::Bool),
        MirType::Struct(name) => MirExpr::Call {
            func: Box::new(MirExpr::Var(
                mangled("Eq", "eq", name),
                MirType::FnPtr(vec![ty.clone(), ty.clone()], Box::new(MirType::Bool)),
            )),
            args: vec![a, b],
            ty: MirType::Bool,
        },
        _ => MirExpr::BinOp {
            op: BinOp::Eq,
            lhs: Box::new(a),
            rhs: Box::new(b),
            ty: MirType::Bool,
        },
    }
}

/// Three-way comparison (Ordering tag) of one field pair.
fn compare_of(a: MirExpr, b: MirExpr, ty: &MirType) -> MirExpr {
    let symbol = match ty {
        MirType::Float => "mesh_float_compare",
        MirType::String => "mesh_string_compare",
        MirType::Struct(name) => {
            return MirExpr::Call {
                func: Box::new(MirExpr::Var(
                    mangled("Ord", "compare", name),
                    MirType::FnPtr(vec![ty.clone(), ty.clone()], Box::new(MirType::Int)),
                )),
                args: vec![a, b],
                ty: MirType::Int,
            };
        }
        _ => "mesh_int_compare",
    };
    rt_call(symbol, vec![a, b], MirType::Int)
}

/// FNV-1a combine: `(h ^ field_hash) * prime`, folded over the fields.
fn fnv_fold(seed: MirExpr, hashes: Vec<MirExpr>) -> MirExpr {
    hashes.into_iter().fold(seed, |h, fh| MirExpr::BinOp {
        op: BinOp::Mul,
        lhs: Box::new(MirExpr::BinOp {
            op: BinOp::BitXor,
            lhs: Box::new(h),
            rhs: Box::new(fh),
            ty: MirType::Int,
        }),
        rhs: Box::new(lit_int(FNV_PRIME)),
        ty: MirType::Int,
    })
}

/// Lexicographic comparison: first non-Equal field decides.
fn lexicographic(mut comparisons: Vec<MirExpr>) -> MirExpr {
    let Some(last) = comparisons.pop() else {
        return lit_int(ORD_EQUAL);
    };
    comparisons.into_iter().rev().fold(last, |rest, cmp| {
        MirExpr::Block(
            vec![
                MirExpr::Let {
                    name: "__cmp".into(),
                    ty: MirType::Int,
                    value: Box::new(cmp),
                },
                MirExpr::If {
                    cond: Box::new(MirExpr::BinOp {
                        op: BinOp::Eq,
                        lhs: Box::new(MirExpr::Var("__cmp".into(), MirType::Int)),
                        rhs: Box::new(lit_int(ORD_EQUAL)),
                        ty: MirType::Bool,
                    }),
                    then_body: Box::new(rest),
                    else_body: Box::new(MirExpr::Var("__cmp".into(), MirType::Int)),
                    ty: MirType::Int,
                },
            ],
            MirType::Int,
        )
    })
}

fn and_all(conds: Vec<MirExpr>) -> MirExpr {
    conds
        .into_iter()
        .reduce(|acc, next| MirExpr::BinOp {
            op: BinOp::And,
            lhs: Box::new(acc),
            rhs: Box::new(next),
            ty: MirType::Bool,
        })
        .unwrap_or(MirExpr::Lit(MirLiteral::Bool(true), MirType::Bool))
}

// ── Structs ─────────────────────────────────────────────────────────────

fn derive_struct(trait_name: &str, def: &MirStructDef) -> Option<MirFunction> {
    let name = &def.name;
    let self_ty = MirType::Struct(name.clone());
    match trait_name {
        "Display" => {
            // "StructName(f1, f2, ...)"
            let mut acc = lit_str(format!("{name}("));
            for (i, (_, fty)) in def.fields.iter().enumerate() {
                if i > 0 {
                    acc = concat(acc, lit_str(", "));
                }
                acc = concat(acc, display_of(field(self_var(name), i, fty.clone()), fty));
            }
            acc = concat(acc, lit_str(")"));
            Some(method_fn(
                mangled("Display", "to_string", name),
                vec![("self".into(), self_ty)],
                MirType::String,
                acc,
            ))
        }
        "Debug" => {
            // "StructName { f1: v1, f2: v2 }"
            let mut acc = lit_str(format!("{name} {{ "));
            for (i, (fname, fty)) in def.fields.iter().enumerate() {
                if i > 0 {
                    acc = concat(acc, lit_str(", "));
                }
                acc = concat(acc, lit_str(format!("{fname}: ")));
                acc = concat(acc, display_of(field(self_var(name), i, fty.clone()), fty));
            }
            acc = concat(acc, lit_str(" }"));
            Some(method_fn(
                mangled("Debug", "inspect", name),
                vec![("self".into(), self_ty)],
                MirType::String,
                acc,
            ))
        }
        "Hash" => {
            let hashes = def
                .fields
                .iter()
                .enumerate()
                .map(|(i, (_, fty))| hash_of(field(self_var(name), i, fty.clone()), fty))
                .collect();
            let body = fnv_fold(lit_int(FNV_OFFSET), hashes);
            Some(method_fn(
                mangled("Hash", "hash", name),
                vec![("self".into(), self_ty)],
                MirType::Int,
                body,
            ))
        }
        "Eq" => {
            let conds = def
                .fields
                .iter()
                .enumerate()
                .map(|(i, (_, fty))| {
                    eq_of(
                        field(self_var(name), i, fty.clone()),
                        field(other_var(name), i, fty.clone()),
                        fty,
                    )
                })
                .collect();
            Some(method_fn(
                mangled("Eq", "eq", name),
                vec![
                    ("self".into(), self_ty.clone()),
                    ("other".into(), self_ty),
                ],
                MirType::Bool,
                and_all(conds),
            ))
        }
        "Ord" => {
            let comparisons = def
                .fields
                .iter()
                .enumerate()
                .map(|(i, (_, fty))| {
                    compare_of(
                        field(self_var(name), i, fty.clone()),
                        field(other_var(name), i, fty.clone()),
                        fty,
                    )
                })
                .collect();
            Some(method_fn(
                mangled("Ord", "compare", name),
                vec![
                    ("self".into(), self_ty.clone()),
                    ("other".into(), self_ty),
                ],
                MirType::Int,
                lexicographic(comparisons),
            ))
        }
        _ => None,
    }
}

// ── Sum types ───────────────────────────────────────────────────────────

fn sum_self_ty(def: &MirSumTypeDef, unboxed: bool) -> MirType {
    if unboxed {
        MirType::Int
    } else {
        MirType::Struct(def.name.clone())
    }
}

fn tag_of(value: MirExpr, unboxed: bool) -> MirExpr {
    if unboxed {
        value
    } else {
        MirExpr::GetTag {
            object: Box::new(value),
        }
    }
}

fn variant_field(value: MirExpr, index: usize, ty: MirType) -> MirExpr {
    MirExpr::VariantField {
        object: Box::new(value),
        index,
        ty,
    }
}

fn derive_sum(trait_name: &str, def: &MirSumTypeDef, unboxed: bool) -> Option<MirFunction> {
    let name = &def.name;
    let self_ty = sum_self_ty(def, unboxed);
    let self_value = || MirExpr::Var("self".into(), self_ty.clone());
    let other_value = || MirExpr::Var("other".into(), self_ty.clone());

    match trait_name {
        "Display" | "Debug" => {
            // Nullary variants print their bare name; non-nullary print
            // "Variant(v0, v1, ...)" binding fields positionally.
            let cases = def
                .variants
                .iter()
                .map(|v| {
                    let body = if v.fields.is_empty() {
                        lit_str(v.name.clone())
                    } else {
                        let mut acc = lit_str(format!("{}(", v.name));
                        for (i, fty) in v.fields.iter().enumerate() {
                            if i > 0 {
                                acc = concat(acc, lit_str(", "));
                            }
                            acc = concat(
                                acc,
                                display_of(
                                    variant_field(self_value(), i, fty.clone()),
                                    fty,
                                ),
                            );
                        }
                        concat(acc, lit_str(")"))
                    };
                    (v.tag as i64, body)
                })
                .collect();
            let body = MirExpr::Switch {
                scrutinee: Box::new(tag_of(self_value(), unboxed)),
                cases,
                default: Some(Box::new(lit_str(""))),
                ty: MirType::String,
            };
            let method = if trait_name == "Display" {
                "to_string"
            } else {
                "inspect"
            };
            Some(method_fn(
                mangled(trait_name, method, name),
                vec![("self".into(), self_ty)],
                MirType::String,
                body,
            ))
        }
        "Hash" => {
            // The tag hashes first, then each field.
            let cases = def
                .variants
                .iter()
                .map(|v| {
                    let seed = fnv_fold(lit_int(FNV_OFFSET), vec![lit_int(v.tag as i64)]);
                    let hashes = v
                        .fields
                        .iter()
                        .enumerate()
                        .map(|(i, fty)| {
                            hash_of(variant_field(self_value(), i, fty.clone()), fty)
                        })
                        .collect();
                    (v.tag as i64, fnv_fold(seed, hashes))
                })
                .collect();
            let body = MirExpr::Switch {
                scrutinee: Box::new(tag_of(self_value(), unboxed)),
                cases,
                default: Some(Box::new(lit_int(0))),
                ty: MirType::Int,
            };
            Some(method_fn(
                mangled("Hash", "hash", name),
                vec![("self".into(), self_ty)],
                MirType::Int,
                body,
            ))
        }
        "Eq" => {
            let body = if unboxed {
                MirExpr::BinOp {
                    op: BinOp::Eq,
                    lhs: Box::new(self_value()),
                    rhs: Box::new(other_value()),
                    ty: MirType::Bool,
                }
            } else {
                // Tags must match, then fields of the shared variant.
                let cases = def
                    .variants
                    .iter()
                    .map(|v| {
                        let conds = v
                            .fields
                            .iter()
                            .enumerate()
                            .map(|(i, fty)| {
                                eq_of(
                                    variant_field(self_value(), i, fty.clone()),
                                    variant_field(other_value(), i, fty.clone()),
                                    fty,
                                )
                            })
                            .collect();
                        (v.tag as i64, and_all(conds))
                    })
                    .collect();
                let same_variant = MirExpr::Switch {
                    scrutinee: Box::new(tag_of(self_value(), unboxed)),
                    cases,
                    default: Some(Box::new(MirExpr::Lit(
                        MirLiteral::Bool(false),
                        MirType::Bool,
                    ))),
                    ty: MirType::Bool,
                };
                MirExpr::If {
                    cond: Box::new(MirExpr::BinOp {
                        op: BinOp::Eq,
                        lhs: Box::new(tag_of(self_value(), unboxed)),
                        rhs: Box::new(tag_of(other_value(), unboxed)),
                        ty: MirType::Bool,
                    }),
                    then_body: Box::new(same_variant),
                    else_body: Box::new(MirExpr::Lit(
                        MirLiteral::Bool(false),
                        MirType::Bool,
                    )),
                    ty: MirType::Bool,
                }
            };
            Some(method_fn(
                mangled("Eq", "eq", name),
                vec![
                    ("self".into(), self_ty.clone()),
                    ("other".into(), self_ty),
                ],
                MirType::Bool,
                body,
            ))
        }
        "Ord" => {
            let body = if unboxed {
                rt_call(
                    "mesh_int_compare",
                    vec![self_value(), other_value()],
                    MirType::Int,
                )
            } else {
                // Tag order decides across variants; fields decide
                // within one.
                let cases = def
                    .variants
                    .iter()
                    .map(|v| {
                        let comparisons = v
                            .fields
                            .iter()
                            .enumerate()
                            .map(|(i, fty)| {
                                compare_of(
                                    variant_field(self_value(), i, fty.clone()),
                                    variant_field(other_value(), i, fty.clone()),
                                    fty,
                                )
                            })
                            .collect();
                        (v.tag as i64, lexicographic(comparisons))
                    })
                    .collect();
                let within = MirExpr::Switch {
                    scrutinee: Box::new(tag_of(self_value(), unboxed)),
                    cases,
                    default: Some(Box::new(lit_int(ORD_EQUAL))),
                    ty: MirType::Int,
                };
                MirExpr::Block(
                    vec![
                        MirExpr::Let {
                            name: "__tagcmp".into(),
                            ty: MirType::Int,
                            value: Box::new(rt_call(
                                "mesh_int_compare",
                                vec![
                                    tag_of(self_value(), unboxed),
                                    tag_of(other_value(), unboxed),
                                ],
                                MirType::Int,
                            )),
                        },
                        MirExpr::If {
                            cond: Box::new(MirExpr::BinOp {
                                op: BinOp::Eq,
                                lhs: Box::new(MirExpr::Var("__tagcmp".into(), MirType::Int)),
                                rhs: Box::new(lit_int(ORD_EQUAL)),
                                ty: MirType::Bool,
                            }),
                            then_body: Box::new(within),
                            else_body: Box::new(MirExpr::Var(
                                "__tagcmp".into(),
                                MirType::Int,
                            )),
                            ty: MirType::Int,
                        },
                    ],
                    MirType::Int,
                )
            };
            Some(method_fn(
                mangled("Ord", "compare", name),
                vec![
                    ("self".into(), self_ty.clone()),
                    ("other".into(), self_ty),
                ],
                MirType::Int,
                body,
            ))
        }
        _ => None,
    }
}

fn method_fn(
    name: String,
    params: Vec<(String, MirType)>,
    return_type: MirType,
    body: MirExpr,
) -> MirFunction {
    MirFunction {
        name,
        params,
        return_type,
        body,
        is_closure_fn: false,
        captures: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::MirVariantDef;
    use mesh_typeck::infer::{StructDefInfo, VariantInfo};
    use mesh_typeck::ty::Ty;

    fn point_def() -> MirStructDef {
        MirStructDef {
            name: "Point".into(),
            fields: vec![("x".into(), MirType::Int), ("y".into(), MirType::Int)],
        }
    }

    fn registry_with_point(derives: &[&str]) -> TypeRegistry {
        let mut reg = TypeRegistry::default();
        reg.struct_defs.insert(
            "Point".into(),
            StructDefInfo {
                name: "Point".into(),
                fields: vec![("x".into(), Ty::int()), ("y".into(), Ty::int())],
                derives: derives.iter().map(|s| s.to_string()).collect(),
                is_pub: true,
            },
        );
        reg
    }

    #[test]
    fn synthesizes_exactly_the_derived_traits() {
        let reg = registry_with_point(&["Display", "Hash"]);
        let fns = synthesize(&[point_def()], &[], &reg);
        let names: Vec<&str> = fns.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"Display__to_string__Point"));
        assert!(names.contains(&"Hash__hash__Point"));
        assert!(!names.iter().any(|n| n.starts_with("Eq__")));
    }

    #[test]
    fn display_struct_builds_positional_format() {
        let reg = registry_with_point(&["Display"]);
        let fns = synthesize(&[point_def()], &[], &reg);
        let f = &fns[0];
        assert_eq!(f.params.len(), 1);
        assert_eq!(f.return_type, MirType::String);
        // The body is a concat chain starting from the "Point(" literal.
        fn contains_lit(e: &MirExpr, needle: &str) -> bool {
            match e {
                MirExpr::Lit(MirLiteral::String(s), _) => s == needle,
                MirExpr::Call { args, .. } => args.iter().any(|a| contains_lit(a, needle)),
                _ => false,
            }
        }
        assert!(contains_lit(&f.body, "Point("));
        assert!(contains_lit(&f.body, ", "));
        assert!(contains_lit(&f.body, ")"));
    }

    #[test]
    fn eq_on_sum_checks_tags_first() {
        let mut reg = TypeRegistry::default();
        reg.sum_type_defs.insert(
            "Shape".into(),
            mesh_typeck::infer::SumTypeDefInfo {
                name: "Shape".into(),
                variants: vec![
                    VariantInfo {
                        name: "Circle".into(),
                        fields: vec![Ty::float()],
                        tag: 0,
                    },
                    VariantInfo {
                        name: "Empty".into(),
                        fields: vec![],
                        tag: 1,
                    },
                ],
                derives: vec!["Eq".into()],
                is_pub: true,
            },
        );
        let sum = MirSumTypeDef {
            name: "Shape".into(),
            variants: vec![
                MirVariantDef {
                    name: "Circle".into(),
                    fields: vec![MirType::Float],
                    tag: 0,
                },
                MirVariantDef {
                    name: "Empty".into(),
                    fields: vec![],
                    tag: 1,
                },
            ],
        };
        let fns = synthesize(&[], &[sum], &reg);
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0].name, "Eq__eq__Shape");
        assert!(matches!(fns[0].body, MirExpr::If { .. }));
    }

    #[test]
    fn unboxed_sum_hash_switches_on_the_value() {
        let mut reg = TypeRegistry::default();
        reg.sum_type_defs.insert(
            "Color".into(),
            mesh_typeck::infer::SumTypeDefInfo {
                name: "Color".into(),
                variants: vec![
                    VariantInfo {
                        name: "Red".into(),
                        fields: vec![],
                        tag: 0,
                    },
                    VariantInfo {
                        name: "Blue".into(),
                        fields: vec![],
                        tag: 1,
                    },
                ],
                derives: vec!["Hash".into()],
                is_pub: true,
            },
        );
        let sum = MirSumTypeDef {
            name: "Color".into(),
            variants: vec![
                MirVariantDef {
                    name: "Red".into(),
                    fields: vec![],
                    tag: 0,
                },
                MirVariantDef {
                    name: "Blue".into(),
                    fields: vec![],
                    tag: 1,
                },
            ],
        };
        let fns = synthesize(&[], &[sum], &reg);
        assert_eq!(fns[0].params[0].1, MirType::Int);
        assert!(matches!(fns[0].body, MirExpr::Switch { .. }));
    }
}
