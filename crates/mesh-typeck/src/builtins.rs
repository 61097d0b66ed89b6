//! Built-in types, functions, numeric traits, and the stdlib method
//! tables used by method-call resolution on primitive types.

use crate::env::TypeEnv;
use crate::traits::{ImplMethodSig, TraitDef, TraitImplDef, TraitMethodSig, TraitRegistry};
use crate::ty::{Scheme, Ty};
use crate::unify::TyCtx;
use rustc_hash::FxHashMap;

/// Built-in nominal types recognized in annotations.
pub const BUILTIN_TYPES: &[&str] = &[
    "Int", "Float", "Bool", "String", "Unit", "List", "Map", "Set", "Option", "Result", "Pid",
    "Range", "Iter", "Ordering",
];

/// Sum types that exist without a user declaration.
pub fn is_builtin_sum_type(name: &str) -> bool {
    matches!(name, "Option" | "Result" | "Ordering")
}

/// Install built-in functions and variant constructors into the global
/// environment.
pub fn install(env: &mut TypeEnv, ctx: &mut TyCtx) {
    let unit = Ty::unit();

    env.insert(
        "println",
        Scheme::mono(Ty::Fun(vec![Ty::string()], Box::new(unit.clone()))),
    );
    env.insert(
        "print",
        Scheme::mono(Ty::Fun(vec![Ty::string()], Box::new(unit.clone()))),
    );
    env.insert(
        "readline",
        Scheme::mono(Ty::Fun(vec![], Box::new(Ty::string()))),
    );
    env.insert(
        "range",
        Scheme::mono(Ty::Fun(
            vec![Ty::int(), Ty::int()],
            Box::new(Ty::Con("Range".into())),
        )),
    );
    env.insert(
        "sleep",
        Scheme::mono(Ty::Fun(vec![Ty::int()], Box::new(unit.clone()))),
    );
    env.insert(
        "self_pid",
        Scheme::mono(Ty::Fun(vec![], Box::new(Ty::pid()))),
    );

    // panic(msg) -> a   (diverges; typed as a free result variable)
    let a = fresh_var_id(ctx);
    env.insert(
        "panic",
        Scheme {
            vars: vec![a],
            ty: Ty::Fun(vec![Ty::string()], Box::new(Ty::Var(a))),
        },
    );

    // HTTP server: handler maps raw request text to response body text.
    env.insert(
        "http_serve",
        Scheme::mono(Ty::Fun(
            vec![
                Ty::int(),
                Ty::Fun(vec![Ty::string()], Box::new(Ty::string())),
            ],
            Box::new(unit.clone()),
        )),
    );

    // WebSocket servers: callbacks receive a connection id.
    let conn = Ty::int();
    let on_connect = Ty::Fun(vec![conn.clone()], Box::new(unit.clone()));
    let on_msg = Ty::Fun(vec![conn.clone(), Ty::string()], Box::new(unit.clone()));
    let on_close = Ty::Fun(vec![conn.clone()], Box::new(unit.clone()));
    env.insert(
        "ws_serve",
        Scheme::mono(Ty::Fun(
            vec![
                on_connect.clone(),
                on_msg.clone(),
                on_close.clone(),
                Ty::int(),
            ],
            Box::new(unit.clone()),
        )),
    );
    env.insert(
        "ws_serve_tls",
        Scheme::mono(Ty::Fun(
            vec![
                on_connect,
                on_msg,
                on_close,
                Ty::int(),
                Ty::string(),
                Ty::string(),
            ],
            Box::new(unit.clone()),
        )),
    );
    env.insert(
        "ws_send",
        Scheme::mono(Ty::Fun(vec![conn, Ty::string()], Box::new(unit.clone()))),
    );
    env.insert(
        "ws_close",
        Scheme::mono(Ty::Fun(vec![Ty::int()], Box::new(unit.clone()))),
    );

    // Option/Result/Ordering variant constructors.
    let t = fresh_var_id(ctx);
    env.insert(
        "Some",
        Scheme {
            vars: vec![t],
            ty: Ty::Fun(vec![Ty::Var(t)], Box::new(Ty::option(Ty::Var(t)))),
        },
    );
    let t = fresh_var_id(ctx);
    env.insert(
        "None",
        Scheme {
            vars: vec![t],
            ty: Ty::option(Ty::Var(t)),
        },
    );
    let (t, e) = (fresh_var_id(ctx), fresh_var_id(ctx));
    env.insert(
        "Ok",
        Scheme {
            vars: vec![t, e],
            ty: Ty::Fun(
                vec![Ty::Var(t)],
                Box::new(Ty::result(Ty::Var(t), Ty::Var(e))),
            ),
        },
    );
    let (t, e) = (fresh_var_id(ctx), fresh_var_id(ctx));
    env.insert(
        "Err",
        Scheme {
            vars: vec![t, e],
            ty: Ty::Fun(
                vec![Ty::Var(e)],
                Box::new(Ty::result(Ty::Var(t), Ty::Var(e))),
            ),
        },
    );
    for name in ["Less", "Equal", "Greater"] {
        env.insert(name, Scheme::mono(Ty::Con("Ordering".into())));
    }
}

fn fresh_var_id(ctx: &mut TyCtx) -> u32 {
    match ctx.fresh() {
        Ty::Var(v) => v,
        _ => unreachable!("fresh always returns a variable"),
    }
}

// ── Numeric and conversion traits ───────────────────────────────────────

/// Register the numeric operator traits (Add/Sub/Mul/Div/Neg with an
/// `Output` associated type), the comparison/display traits for the
/// primitive types, and the From conversion trait.
pub fn install_traits(traits: &mut TraitRegistry) {
    for (trait_name, method) in [
        ("Add", "add"),
        ("Sub", "sub"),
        ("Mul", "mul"),
        ("Div", "div"),
    ] {
        traits.define_trait(TraitDef {
            name: trait_name.to_string(),
            methods: vec![TraitMethodSig {
                name: method.to_string(),
                params: vec![Ty::Con("Self".into()), Ty::Con("Self".into())],
                ret: Ty::Con("Self.Output".into()),
                has_self: true,
            }],
            assoc_types: vec!["Output".to_string()],
            is_pub: true,
        });
        for prim in [Ty::int(), Ty::float()] {
            traits.add_impl(numeric_impl(trait_name, method, prim));
        }
    }

    traits.define_trait(TraitDef {
        name: "Neg".to_string(),
        methods: vec![TraitMethodSig {
            name: "neg".to_string(),
            params: vec![Ty::Con("Self".into())],
            ret: Ty::Con("Self.Output".into()),
            has_self: true,
        }],
        assoc_types: vec!["Output".to_string()],
        is_pub: true,
    });
    for prim in [Ty::int(), Ty::float()] {
        let mut methods = FxHashMap::default();
        methods.insert(
            "neg".to_string(),
            ImplMethodSig {
                param_count: 1,
                return_type: prim.clone(),
            },
        );
        let mut assoc = FxHashMap::default();
        assoc.insert("Output".to_string(), prim.clone());
        traits.add_impl(TraitImplDef {
            trait_name: "Neg".to_string(),
            impl_type: prim,
            methods,
            assoc_bindings: assoc,
        });
    }

    // Display/Debug for the primitives, so interpolation and auto-derive
    // dispatch always have a `to_string`/`inspect` target.
    for (trait_name, method) in [("Display", "to_string"), ("Debug", "inspect")] {
        traits.define_trait(TraitDef {
            name: trait_name.to_string(),
            methods: vec![TraitMethodSig {
                name: method.to_string(),
                params: vec![Ty::Con("Self".into())],
                ret: Ty::string(),
                has_self: true,
            }],
            assoc_types: vec![],
            is_pub: true,
        });
        for prim in [Ty::int(), Ty::float(), Ty::bool(), Ty::string()] {
            let mut methods = FxHashMap::default();
            methods.insert(
                method.to_string(),
                ImplMethodSig {
                    param_count: 1,
                    return_type: Ty::string(),
                },
            );
            traits.add_impl(TraitImplDef {
                trait_name: trait_name.to_string(),
                impl_type: prim,
                methods,
                assoc_bindings: FxHashMap::default(),
            });
        }
    }

    // Eq / Ord / Hash for primitives.
    for (trait_name, method, ret) in [
        ("Eq", "eq", Ty::bool()),
        ("Ord", "compare", Ty::Con("Ordering".into())),
        ("Hash", "hash", Ty::int()),
    ] {
        let params = if trait_name == "Hash" {
            vec![Ty::Con("Self".into())]
        } else {
            vec![Ty::Con("Self".into()), Ty::Con("Self".into())]
        };
        traits.define_trait(TraitDef {
            name: trait_name.to_string(),
            methods: vec![TraitMethodSig {
                name: method.to_string(),
                params: params.clone(),
                ret: ret.clone(),
                has_self: true,
            }],
            assoc_types: vec![],
            is_pub: true,
        });
        for prim in [Ty::int(), Ty::float(), Ty::bool(), Ty::string()] {
            let mut methods = FxHashMap::default();
            methods.insert(
                method.to_string(),
                ImplMethodSig {
                    param_count: params.len(),
                    return_type: ret.clone(),
                },
            );
            traits.add_impl(TraitImplDef {
                trait_name: trait_name.to_string(),
                impl_type: prim,
                methods,
                assoc_bindings: FxHashMap::default(),
            });
        }
    }

    // From conversion trait, used by `?` to convert Err variants.
    traits.define_trait(TraitDef {
        name: "From".to_string(),
        methods: vec![TraitMethodSig {
            name: "from".to_string(),
            params: vec![Ty::Con("Self".into())],
            ret: Ty::Con("Self".into()),
            has_self: false,
        }],
        assoc_types: vec![],
        is_pub: true,
    });
}

fn numeric_impl(trait_name: &str, method: &str, prim: Ty) -> TraitImplDef {
    let mut methods = FxHashMap::default();
    methods.insert(
        method.to_string(),
        ImplMethodSig {
            param_count: 2,
            return_type: prim.clone(),
        },
    );
    let mut assoc = FxHashMap::default();
    assoc.insert("Output".to_string(), prim.clone());
    TraitImplDef {
        trait_name: trait_name.to_string(),
        impl_type: prim,
        methods,
        assoc_bindings: assoc,
    }
}

// ── Stdlib method tables ────────────────────────────────────────────────

/// The stdlib method for `head.method`, typed with the receiver's type
/// arguments. Returns a function type whose first parameter is `self`.
/// Iterator combinators are typed lazily: `map`/`filter` yield `Iter<T>`
/// values that collapse back to `List` at `collect`.
pub fn builtin_method(head: &str, method: &str, args: &[Ty], ctx: &mut TyCtx) -> Option<Ty> {
    let arg = |i: usize| -> Ty {
        args.get(i).cloned().unwrap_or(Ty::Con("Int".into()))
    };
    let fun = |params: Vec<Ty>, ret: Ty| Some(Ty::Fun(params, Box::new(ret)));

    match head {
        "String" => {
            let s = Ty::string();
            match method {
                "len" => fun(vec![s], Ty::int()),
                "contains" | "starts_with" | "ends_with" => {
                    fun(vec![s.clone(), s], Ty::bool())
                }
                "concat" => fun(vec![s.clone(), s.clone()], s),
                "split" => fun(vec![s.clone(), s.clone()], Ty::list(s)),
                "trim" | "to_upper" | "to_lower" => fun(vec![s.clone()], s),
                "replace" => fun(vec![s.clone(), s.clone(), s.clone()], s),
                "slice" => fun(vec![s.clone(), Ty::int(), Ty::int()], s),
                "to_int" => fun(vec![s], Ty::option(Ty::int())),
                _ => None,
            }
        }
        "List" => {
            let t = arg(0);
            let list = Ty::list(t.clone());
            match method {
                "len" => fun(vec![list], Ty::int()),
                "push" => fun(vec![list.clone(), t], list),
                "get" => fun(vec![list, Ty::int()], Ty::option(t)),
                "head" => fun(vec![list], Ty::option(t)),
                "tail" | "reverse" | "sort" => fun(vec![list.clone()], list),
                "contains" => fun(vec![list, t], Ty::bool()),
                "zip" => {
                    let u = ctx.fresh();
                    fun(
                        vec![list, Ty::list(u.clone())],
                        Ty::list(Ty::Tuple(vec![t, u])),
                    )
                }
                "flat_map" => {
                    let u = ctx.fresh();
                    fun(
                        vec![
                            list,
                            Ty::Fun(vec![t], Box::new(Ty::list(u.clone()))),
                        ],
                        Ty::list(u),
                    )
                }
                "map" => {
                    let u = ctx.fresh();
                    fun(
                        vec![list, Ty::Fun(vec![t], Box::new(u.clone()))],
                        Ty::App("Iter".into(), vec![u]),
                    )
                }
                "filter" => fun(
                    vec![
                        list,
                        Ty::Fun(vec![t.clone()], Box::new(Ty::bool())),
                    ],
                    Ty::App("Iter".into(), vec![t]),
                ),
                "fold" => {
                    let acc = ctx.fresh();
                    fun(
                        vec![
                            list,
                            acc.clone(),
                            Ty::Fun(vec![acc.clone(), t], Box::new(acc.clone())),
                        ],
                        acc,
                    )
                }
                _ => None,
            }
        }
        "Iter" => {
            let t = arg(0);
            let iter = Ty::App("Iter".into(), vec![t.clone()]);
            match method {
                "map" => {
                    let u = ctx.fresh();
                    fun(
                        vec![iter, Ty::Fun(vec![t], Box::new(u.clone()))],
                        Ty::App("Iter".into(), vec![u]),
                    )
                }
                "filter" => fun(
                    vec![
                        iter.clone(),
                        Ty::Fun(vec![t], Box::new(Ty::bool())),
                    ],
                    iter,
                ),
                "collect" => fun(vec![iter], Ty::list(t)),
                "count" => fun(vec![iter], Ty::int()),
                _ => None,
            }
        }
        "Map" => {
            let (k, v) = (arg(0), arg(1));
            let map = Ty::App("Map".into(), vec![k.clone(), v.clone()]);
            match method {
                "len" => fun(vec![map], Ty::int()),
                "get" => fun(vec![map, k], Ty::option(v)),
                "insert" => fun(vec![map.clone(), k, v], map),
                "remove" => fun(vec![map.clone(), k], map),
                "contains_key" => fun(vec![map, k], Ty::bool()),
                "merge" => fun(vec![map.clone(), map.clone()], map),
                "to_list" => fun(vec![map], Ty::list(Ty::Tuple(vec![k, v]))),
                _ => None,
            }
        }
        "Set" => {
            let t = arg(0);
            let set = Ty::App("Set".into(), vec![t.clone()]);
            match method {
                "len" => fun(vec![set], Ty::int()),
                "add" | "remove" => fun(vec![set.clone(), t], set),
                "contains" => fun(vec![set, t], Ty::bool()),
                "to_list" => fun(vec![set], Ty::list(t)),
                _ => None,
            }
        }
        "Int" => match method {
            "abs" => fun(vec![Ty::int()], Ty::int()),
            "to_float" => fun(vec![Ty::int()], Ty::float()),
            _ => None,
        },
        "Float" => match method {
            "abs" | "sqrt" | "floor" | "ceil" => fun(vec![Ty::float()], Ty::float()),
            "round" | "to_int" => fun(vec![Ty::float()], Ty::int()),
            _ => None,
        },
        "Option" => {
            let t = arg(0);
            let opt = Ty::option(t.clone());
            match method {
                "is_some" | "is_none" => fun(vec![opt], Ty::bool()),
                "unwrap_or" => fun(vec![opt, t.clone()], t),
                _ => None,
            }
        }
        "Result" => {
            let (t, e) = (arg(0), arg(1));
            let res = Ty::result(t.clone(), e);
            match method {
                "is_ok" | "is_err" => fun(vec![res], Ty::bool()),
                "unwrap_or" => fun(vec![res, t.clone()], t),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Stdlib modules addressable with qualified access (`Math.sqrt(x)`).
pub fn stdlib_module_fn(module: &str, name: &str, ctx: &mut TyCtx) -> Option<Ty> {
    let fun = |params: Vec<Ty>, ret: Ty| Some(Ty::Fun(params, Box::new(ret)));
    match module {
        "Math" => match name {
            "sqrt" | "sin" | "cos" | "log" => fun(vec![Ty::float()], Ty::float()),
            "pow" => fun(vec![Ty::float(), Ty::float()], Ty::float()),
            "abs" => fun(vec![Ty::int()], Ty::int()),
            "pi" => Some(Ty::float()),
            _ => None,
        },
        "Map" => match name {
            // Int-keyed by default; string keys flow through the
            // dedicated string-keyed constructor.
            "new" => {
                let v = ctx.fresh();
                fun(vec![], Ty::App("Map".into(), vec![Ty::int(), v]))
            }
            "new_str" => {
                let v = ctx.fresh();
                fun(vec![], Ty::App("Map".into(), vec![Ty::string(), v]))
            }
            "from_list" => {
                let v = ctx.fresh();
                fun(
                    vec![Ty::list(Ty::Tuple(vec![Ty::int(), v.clone()]))],
                    Ty::App("Map".into(), vec![Ty::int(), v]),
                )
            }
            _ => None,
        },
        "Set" => match name {
            "new" => fun(vec![], Ty::App("Set".into(), vec![Ty::int()])),
            "from_list" => fun(
                vec![Ty::list(Ty::int())],
                Ty::App("Set".into(), vec![Ty::int()]),
            ),
            _ => None,
        },
        "String" => match name {
            "from_int" => fun(vec![Ty::int()], Ty::string()),
            "from_float" => fun(vec![Ty::float()], Ty::string()),
            _ => None,
        },
        "Time" => match name {
            "now_ms" => fun(vec![], Ty::int()),
            _ => None,
        },
        _ => None,
    }
}

/// Whether `name` is a stdlib module usable in qualified position.
pub fn is_stdlib_module(name: &str) -> bool {
    matches!(name, "Math" | "Map" | "Set" | "String" | "Time")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_map_returns_lazy_iter() {
        let mut ctx = TyCtx::new();
        let ty = builtin_method("List", "map", &[Ty::int()], &mut ctx).unwrap();
        let Ty::Fun(_, ret) = ty else { panic!() };
        assert!(matches!(*ret, Ty::App(ref n, _) if n == "Iter"));
    }

    #[test]
    fn iter_collect_collapses_to_list() {
        let mut ctx = TyCtx::new();
        let ty = builtin_method("Iter", "collect", &[Ty::string()], &mut ctx).unwrap();
        let Ty::Fun(_, ret) = ty else { panic!() };
        assert_eq!(*ret, Ty::list(Ty::string()));
    }

    #[test]
    fn numeric_traits_cover_int_and_float() {
        let mut traits = TraitRegistry::new();
        install_traits(&mut traits);
        let mut ctx = TyCtx::new();
        assert_eq!(
            traits.find_method_traits("add", &Ty::int(), &mut ctx),
            vec!["Add"]
        );
        assert_eq!(
            traits.lookup_assoc("Add", &Ty::float(), "Output"),
            Some(Ty::float())
        );
    }

    #[test]
    fn map_module_defaults_to_int_keys() {
        let mut ctx = TyCtx::new();
        let ty = stdlib_module_fn("Map", "new", &mut ctx).unwrap();
        let Ty::Fun(_, ret) = ty else { panic!() };
        let Ty::App(_, args) = *ret else { panic!() };
        assert_eq!(args[0], Ty::int());
    }
}
