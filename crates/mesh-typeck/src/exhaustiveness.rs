//! Match exhaustiveness checking.
//!
//! String (and numeric) literal patterns each count as a distinct
//! constructor, so a match over an open literal domain is only exhaustive
//! with a wildcard arm. Guarded arms never contribute to coverage.

use crate::infer::TypeRegistry;
use crate::ty::Ty;

/// A pattern reduced to what exhaustiveness cares about.
#[derive(Debug, Clone)]
pub enum SimplePat {
    /// `_` or a binding name: matches everything.
    Irrefutable,
    /// A literal, keyed by its textual form.
    Literal(String),
    /// A constructor pattern with sub-patterns.
    Ctor { variant: String, args: Vec<SimplePat> },
    Tuple(Vec<SimplePat>),
    Or(Vec<SimplePat>),
}

impl SimplePat {
    fn is_irrefutable(&self) -> bool {
        match self {
            SimplePat::Irrefutable => true,
            SimplePat::Tuple(items) => items.iter().all(|p| p.is_irrefutable()),
            SimplePat::Or(alts) => alts.iter().any(|p| p.is_irrefutable()),
            _ => false,
        }
    }

    fn flatten<'a>(&'a self, out: &mut Vec<&'a SimplePat>) {
        match self {
            SimplePat::Or(alts) => {
                for a in alts {
                    a.flatten(out);
                }
            }
            other => out.push(other),
        }
    }
}

/// One arm: its pattern plus whether a guard makes it conditional.
#[derive(Debug, Clone)]
pub struct ArmPat {
    pub pat: SimplePat,
    pub guarded: bool,
}

/// Check a match over `scrutinee_ty`. `Err` carries the missing cases
/// (may be empty when only a wildcard would help, e.g. string matches).
pub fn check_match(
    scrutinee_ty: &Ty,
    arms: &[ArmPat],
    registry: &TypeRegistry,
) -> Result<(), Vec<String>> {
    let unguarded: Vec<&SimplePat> = {
        let mut v = Vec::new();
        for arm in arms.iter().filter(|a| !a.guarded) {
            arm.pat.flatten(&mut v);
        }
        v
    };

    if unguarded.iter().any(|p| p.is_irrefutable()) {
        return Ok(());
    }

    match scrutinee_ty {
        Ty::Con(name) if name == "Bool" => {
            let mut missing = Vec::new();
            for lit in ["true", "false"] {
                let covered = unguarded
                    .iter()
                    .any(|p| matches!(p, SimplePat::Literal(l) if l == lit));
                if !covered {
                    missing.push(lit.to_string());
                }
            }
            if missing.is_empty() {
                Ok(())
            } else {
                Err(missing)
            }
        }
        Ty::Con(name) | Ty::App(name, _) => {
            if let Some(variants) = variant_names(name, registry) {
                let mut missing = Vec::new();
                for v in &variants {
                    let covered = unguarded.iter().any(|p| match p {
                        SimplePat::Ctor { variant, args } => {
                            variant == v && args.iter().all(|a| a.is_irrefutable())
                        }
                        _ => false,
                    });
                    if !covered {
                        missing.push(v.clone());
                    }
                }
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(missing)
                }
            } else {
                // Open domains (String, Int, Float, structs): literal arms
                // can never cover everything.
                Err(Vec::new())
            }
        }
        // Tuples without an irrefutable arm, and unresolved variables,
        // are conservatively non-exhaustive.
        _ => Err(Vec::new()),
    }
}

fn variant_names(type_name: &str, registry: &TypeRegistry) -> Option<Vec<String>> {
    match type_name {
        "Option" => Some(vec!["Some".into(), "None".into()]),
        "Result" => Some(vec!["Ok".into(), "Err".into()]),
        "Ordering" => Some(vec!["Less".into(), "Equal".into(), "Greater".into()]),
        _ => registry
            .sum_type_defs
            .get(type_name)
            .map(|def| def.variants.iter().map(|v| v.name.clone()).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::{SumTypeDefInfo, VariantInfo};

    fn registry_with_shape() -> TypeRegistry {
        let mut reg = TypeRegistry::default();
        reg.sum_type_defs.insert(
            "Shape".to_string(),
            SumTypeDefInfo {
                name: "Shape".to_string(),
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
                derives: vec![],
                is_pub: true,
            },
        );
        reg
    }

    fn ctor(variant: &str, args: Vec<SimplePat>) -> ArmPat {
        ArmPat {
            pat: SimplePat::Ctor {
                variant: variant.into(),
                args,
            },
            guarded: false,
        }
    }

    #[test]
    fn string_match_requires_wildcard() {
        let reg = TypeRegistry::default();
        let arms = vec![
            ArmPat {
                pat: SimplePat::Literal("\"alice\"".into()),
                guarded: false,
            },
            ArmPat {
                pat: SimplePat::Literal("\"bob\"".into()),
                guarded: false,
            },
        ];
        assert!(check_match(&Ty::string(), &arms, &reg).is_err());

        let mut with_wild = arms;
        with_wild.push(ArmPat {
            pat: SimplePat::Irrefutable,
            guarded: false,
        });
        assert!(check_match(&Ty::string(), &with_wild, &reg).is_ok());
    }

    #[test]
    fn sum_type_reports_missing_variant() {
        let reg = registry_with_shape();
        let arms = vec![ctor("Circle", vec![SimplePat::Irrefutable])];
        let missing = check_match(&Ty::Con("Shape".into()), &arms, &reg).unwrap_err();
        assert_eq!(missing, vec!["Empty"]);
    }

    #[test]
    fn all_variants_covered_is_exhaustive() {
        let reg = registry_with_shape();
        let arms = vec![
            ctor("Circle", vec![SimplePat::Irrefutable]),
            ctor("Empty", vec![]),
        ];
        assert!(check_match(&Ty::Con("Shape".into()), &arms, &reg).is_ok());
    }

    #[test]
    fn guarded_arms_do_not_count() {
        let reg = TypeRegistry::default();
        let arms = vec![ArmPat {
            pat: SimplePat::Irrefutable,
            guarded: true,
        }];
        assert!(check_match(&Ty::string(), &arms, &reg).is_err());
    }

    #[test]
    fn bool_needs_both_literals() {
        let reg = TypeRegistry::default();
        let arms = vec![ArmPat {
            pat: SimplePat::Literal("true".into()),
            guarded: false,
        }];
        let missing = check_match(&Ty::bool(), &arms, &reg).unwrap_err();
        assert_eq!(missing, vec!["false"]);
    }
}
