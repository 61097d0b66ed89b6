//! Type environment with a scope stack.

use crate::ty::Scheme;
use crate::unify::TyCtx;
use rustc_hash::FxHashMap;

/// Lexically scoped name -> scheme bindings.
pub struct TypeEnv {
    scopes: Vec<FxHashMap<String, Scheme>>,
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeEnv {
    pub fn new() -> TypeEnv {
        TypeEnv {
            scopes: vec![FxHashMap::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the global scope");
        self.scopes.pop();
    }

    pub fn insert(&mut self, name: impl Into<String>, scheme: Scheme) {
        self.scopes
            .last_mut()
            .expect("at least one scope")
            .insert(name.into(), scheme);
    }

    /// Innermost binding wins.
    pub fn lookup(&self, name: &str) -> Option<&Scheme> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    /// Drop the innermost binding of `name`. Used before generalizing a
    /// function over its own recursive monomorphic binding.
    pub fn remove(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if scope.remove(name).is_some() {
                return;
            }
        }
    }

    /// All visible names, for fuzzy suggestions. Shadowed names appear once.
    pub fn names(&self) -> Vec<String> {
        let mut seen = FxHashMap::default();
        for scope in self.scopes.iter().rev() {
            for name in scope.keys() {
                seen.entry(name.clone()).or_insert(());
            }
        }
        seen.into_keys().collect()
    }

    /// Free variables of every binding, used by generalization to avoid
    /// quantifying variables the environment still constrains.
    pub fn free_vars(&self, ctx: &mut TyCtx) -> Vec<u32> {
        let mut out = Vec::new();
        for scope in &self.scopes {
            for scheme in scope.values() {
                let resolved = ctx.resolve(&scheme.ty);
                let mut vars = Vec::new();
                resolved.free_vars(&mut vars);
                for v in vars {
                    if !scheme.vars.contains(&v) && !out.contains(&v) {
                        out.push(v);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Ty;

    #[test]
    fn inner_scopes_shadow_outer() {
        let mut env = TypeEnv::new();
        env.insert("x", Scheme::mono(Ty::int()));
        env.push_scope();
        env.insert("x", Scheme::mono(Ty::string()));
        assert_eq!(env.lookup("x").unwrap().ty, Ty::string());
        env.pop_scope();
        assert_eq!(env.lookup("x").unwrap().ty, Ty::int());
    }

    #[test]
    fn lookup_missing_is_none() {
        let env = TypeEnv::new();
        assert!(env.lookup("nope").is_none());
    }
}
