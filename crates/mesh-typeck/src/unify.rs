//! Unification engine: an ena union-find table with occurs check,
//! instantiation, and environment-aware generalization.

use crate::env::TypeEnv;
use crate::ty::{Scheme, Ty};
use ena::unify::{EqUnifyValue, InPlaceUnificationTable, UnifyKey};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TyVid(pub u32);

impl UnifyKey for TyVid {
    type Value = Option<Ty>;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        TyVid(u)
    }

    fn tag() -> &'static str {
        "TyVid"
    }
}

impl EqUnifyValue for Ty {}

/// The substitution table used during unification.
pub struct TyCtx {
    table: InPlaceUnificationTable<TyVid>,
}

/// A failed unification, carrying the two resolved types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifyError {
    pub expected: Ty,
    pub found: Ty,
}

impl Default for TyCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl TyCtx {
    pub fn new() -> TyCtx {
        TyCtx {
            table: InPlaceUnificationTable::new(),
        }
    }

    /// A fresh unification variable.
    pub fn fresh(&mut self) -> Ty {
        Ty::Var(self.table.new_key(None).0)
    }

    /// Follow variable bindings one level.
    fn shallow_resolve(&mut self, ty: &Ty) -> Ty {
        let mut ty = ty.clone();
        while let Ty::Var(v) = ty {
            match self.table.probe_value(TyVid(v)) {
                Some(bound) => ty = bound,
                None => return Ty::Var(self.table.find(TyVid(v)).0),
            }
        }
        ty
    }

    /// Fully substitute bound variables in `ty`.
    pub fn resolve(&mut self, ty: &Ty) -> Ty {
        let ty = self.shallow_resolve(ty);
        match ty {
            Ty::Var(_) | Ty::Con(_) => ty,
            Ty::App(name, args) => {
                Ty::App(name, args.iter().map(|a| self.resolve(a)).collect())
            }
            Ty::Tuple(items) => Ty::Tuple(items.iter().map(|t| self.resolve(t)).collect()),
            Ty::Fun(params, ret) => Ty::Fun(
                params.iter().map(|p| self.resolve(p)).collect(),
                Box::new(self.resolve(&ret)),
            ),
        }
    }

    /// Unify two types, updating the substitution.
    pub fn unify(&mut self, a: &Ty, b: &Ty) -> Result<(), UnifyError> {
        let a = self.shallow_resolve(a);
        let b = self.shallow_resolve(b);
        match (&a, &b) {
            (Ty::Var(x), Ty::Var(y)) => {
                if x != y {
                    // Both unbound after shallow resolution; merging cannot
                    // conflict.
                    let _ = self.table.unify_var_var(TyVid(*x), TyVid(*y));
                }
                Ok(())
            }
            (Ty::Var(x), other) | (other, Ty::Var(x)) => {
                let resolved = self.resolve(other);
                if resolved.contains_var(*x) {
                    return Err(UnifyError {
                        expected: Ty::Var(*x),
                        found: resolved,
                    });
                }
                let _ = self.table.unify_var_value(TyVid(*x), Some(resolved));
                Ok(())
            }
            (Ty::Con(n1), Ty::Con(n2)) if n1 == n2 => Ok(()),
            (Ty::App(n1, args1), Ty::App(n2, args2))
                if n1 == n2 && args1.len() == args2.len() =>
            {
                for (x, y) in args1.iter().zip(args2) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (Ty::Tuple(t1), Ty::Tuple(t2)) if t1.len() == t2.len() => {
                for (x, y) in t1.iter().zip(t2) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (Ty::Fun(p1, r1), Ty::Fun(p2, r2)) if p1.len() == p2.len() => {
                for (x, y) in p1.iter().zip(p2) {
                    self.unify(x, y)?;
                }
                self.unify(r1, r2)
            }
            _ => Err(UnifyError {
                expected: self.resolve(&a),
                found: self.resolve(&b),
            }),
        }
    }

    /// Whether `a` and `b` could unify, without committing any bindings.
    /// Used by trait-method lookup to test candidate impls.
    pub fn can_unify_fresh(&mut self, a: &Ty, b: &Ty) -> bool {
        let a = self.resolve(a);
        let b = self.resolve(b);
        fn go(a: &Ty, b: &Ty) -> bool {
            match (a, b) {
                (Ty::Var(_), _) | (_, Ty::Var(_)) => true,
                (Ty::Con(x), Ty::Con(y)) => x == y,
                (Ty::App(x, xs), Ty::App(y, ys)) => {
                    x == y && xs.len() == ys.len() && xs.iter().zip(ys).all(|(a, b)| go(a, b))
                }
                (Ty::Tuple(xs), Ty::Tuple(ys)) => {
                    xs.len() == ys.len() && xs.iter().zip(ys).all(|(a, b)| go(a, b))
                }
                (Ty::Fun(xs, xr), Ty::Fun(ys, yr)) => {
                    xs.len() == ys.len()
                        && xs.iter().zip(ys).all(|(a, b)| go(a, b))
                        && go(xr, yr)
                }
                _ => false,
            }
        }
        go(&a, &b)
    }

    /// Instantiate a scheme: bound variables become fresh ones.
    pub fn instantiate(&mut self, scheme: &Scheme) -> Ty {
        if scheme.vars.is_empty() {
            return scheme.ty.clone();
        }
        let mut mapping = FxHashMap::default();
        for &v in &scheme.vars {
            mapping.insert(v, self.fresh());
        }
        self.substitute(&scheme.ty, &mapping)
    }

    /// Replace the mapped variables in `ty`. Used for scheme instantiation
    /// and for refreshing generic struct/variant field types per use site.
    pub fn substitute(&mut self, ty: &Ty, mapping: &FxHashMap<u32, Ty>) -> Ty {
        match ty {
            Ty::Var(v) => mapping.get(v).cloned().unwrap_or(Ty::Var(*v)),
            Ty::Con(_) => ty.clone(),
            Ty::App(name, args) => Ty::App(
                name.clone(),
                args.iter().map(|a| self.substitute(a, mapping)).collect(),
            ),
            Ty::Tuple(items) => Ty::Tuple(
                items.iter().map(|t| self.substitute(t, mapping)).collect(),
            ),
            Ty::Fun(params, ret) => Ty::Fun(
                params.iter().map(|p| self.substitute(p, mapping)).collect(),
                Box::new(self.substitute(ret, mapping)),
            ),
        }
    }

    /// Generalize `ty`: quantify its free variables that are not free in
    /// the environment (let-generalization).
    pub fn generalize(&mut self, env: &TypeEnv, ty: &Ty) -> Scheme {
        let ty = self.resolve(ty);
        let mut ty_vars = Vec::new();
        ty.free_vars(&mut ty_vars);
        if ty_vars.is_empty() {
            return Scheme::mono(ty);
        }
        let env_vars = env.free_vars(self);
        let vars: Vec<u32> = ty_vars
            .into_iter()
            .filter(|v| !env_vars.contains(v))
            .collect();
        Scheme { vars, ty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unify_var_with_con() {
        let mut ctx = TyCtx::new();
        let v = ctx.fresh();
        ctx.unify(&v, &Ty::int()).unwrap();
        assert_eq!(ctx.resolve(&v), Ty::int());
    }

    #[test]
    fn unify_through_chain_of_vars() {
        let mut ctx = TyCtx::new();
        let a = ctx.fresh();
        let b = ctx.fresh();
        ctx.unify(&a, &b).unwrap();
        ctx.unify(&b, &Ty::string()).unwrap();
        assert_eq!(ctx.resolve(&a), Ty::string());
    }

    #[test]
    fn mismatched_constructors_fail() {
        let mut ctx = TyCtx::new();
        let err = ctx.unify(&Ty::int(), &Ty::bool()).unwrap_err();
        assert_eq!(err.expected, Ty::int());
        assert_eq!(err.found, Ty::bool());
    }

    #[test]
    fn occurs_check_rejects_infinite_types() {
        let mut ctx = TyCtx::new();
        let v = ctx.fresh();
        let list_v = Ty::list(v.clone());
        assert!(ctx.unify(&v, &list_v).is_err());
    }

    #[test]
    fn instantiate_replaces_bound_vars() {
        let mut ctx = TyCtx::new();
        let scheme = Scheme {
            vars: vec![0],
            ty: Ty::Fun(vec![Ty::Var(0)], Box::new(Ty::Var(0))),
        };
        let inst = ctx.instantiate(&scheme);
        let Ty::Fun(params, ret) = &inst else {
            panic!()
        };
        assert_eq!(params[0], **ret);
        assert_ne!(params[0], Ty::Var(0));
    }

    #[test]
    fn generalize_quantifies_unconstrained_vars() {
        let mut ctx = TyCtx::new();
        let env = TypeEnv::new();
        let v = ctx.fresh();
        let scheme = ctx.generalize(&env, &Ty::Fun(vec![v.clone()], Box::new(v)));
        assert_eq!(scheme.vars.len(), 1);
    }
}
