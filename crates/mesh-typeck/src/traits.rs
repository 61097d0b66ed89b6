//! Trait (interface) registry: definitions, impls, associated types,
//! and the name-mangled dispatch lookup shared with MIR lowering.

use crate::ty::Ty;
use crate::unify::TyCtx;
use rustc_hash::FxHashMap;

/// One method signature declared by an interface. `Self` appears as the
/// placeholder `Ty::Con("Self")` and is substituted at impl time.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitMethodSig {
    pub name: String,
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub has_self: bool,
}

/// A named contract of method signatures, possibly with associated types.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitDef {
    pub name: String,
    pub methods: Vec<TraitMethodSig>,
    pub assoc_types: Vec<String>,
    pub is_pub: bool,
}

/// The shape of one implemented method, as codegen needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplMethodSig {
    pub param_count: usize,
    pub return_type: Ty,
}

/// One `impl Trait for Type` block.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitImplDef {
    pub trait_name: String,
    pub impl_type: Ty,
    pub methods: FxHashMap<String, ImplMethodSig>,
    pub assoc_bindings: FxHashMap<String, Ty>,
}

impl TraitImplDef {
    /// The type name used in `Trait__Method__Type` mangling.
    pub fn impl_type_name(&self) -> String {
        type_mangle_name(&self.impl_type)
    }
}

/// Impl dispatch uses the mangled symbol `Trait__Method__Type`.
pub fn mangle_trait_method(trait_name: &str, method: &str, ty: &Ty) -> String {
    format!("{}__{}__{}", trait_name, method, type_mangle_name(ty))
}

/// The flat type name used inside mangled symbols.
pub fn type_mangle_name(ty: &Ty) -> String {
    match ty {
        Ty::Con(name) | Ty::App(name, _) => name.clone(),
        Ty::Tuple(items) if items.is_empty() => "Unit".to_string(),
        Ty::Tuple(items) => format!("Tuple{}", items.len()),
        Ty::Fun(..) => "Fn".to_string(),
        Ty::Var(_) => "_".to_string(),
    }
}

/// All known trait definitions and impl registrations.
#[derive(Debug, Default, Clone)]
pub struct TraitRegistry {
    traits: FxHashMap<String, TraitDef>,
    impls: Vec<TraitImplDef>,
}

impl TraitRegistry {
    pub fn new() -> TraitRegistry {
        TraitRegistry::default()
    }

    pub fn define_trait(&mut self, def: TraitDef) {
        self.traits.insert(def.name.clone(), def);
    }

    pub fn get_trait(&self, name: &str) -> Option<&TraitDef> {
        self.traits.get(name)
    }

    pub fn trait_names(&self) -> impl Iterator<Item = &str> {
        self.traits.keys().map(String::as_str)
    }

    pub fn add_impl(&mut self, impl_def: TraitImplDef) {
        self.impls.push(impl_def);
    }

    pub fn all_impls(&self) -> &[TraitImplDef] {
        &self.impls
    }

    /// Whether `ty` has an impl of `trait_name`.
    pub fn has_impl(&self, trait_name: &str, ty: &Ty) -> bool {
        self.find_impl(trait_name, ty).is_some()
    }

    pub fn find_impl(&self, trait_name: &str, ty: &Ty) -> Option<&TraitImplDef> {
        self.impls
            .iter()
            .find(|i| i.trait_name == trait_name && head_matches(&i.impl_type, ty))
    }

    /// All traits that provide `method` for `ty`, matched by fresh
    /// unification of the impl type against the receiver type. More than
    /// one result means the call is ambiguous.
    pub fn find_method_traits(&self, method: &str, ty: &Ty, ctx: &mut TyCtx) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for impl_def in &self.impls {
            if !impl_def.methods.contains_key(method) {
                continue;
            }
            if ctx.can_unify_fresh(&impl_def.impl_type, ty)
                && !out.contains(&impl_def.trait_name)
            {
                out.push(impl_def.trait_name.clone());
            }
        }
        out
    }

    /// Resolve `method` on `ty` to its implemented signature, when exactly
    /// one impl provides it.
    pub fn resolve_trait_method(
        &self,
        method: &str,
        ty: &Ty,
        ctx: &mut TyCtx,
    ) -> Option<(String, ImplMethodSig)> {
        let traits = self.find_method_traits(method, ty, ctx);
        match traits.as_slice() {
            [single] => {
                let impl_def = self
                    .impls
                    .iter()
                    .find(|i| i.trait_name == *single && ctx.can_unify_fresh(&i.impl_type, ty))?;
                impl_def
                    .methods
                    .get(method)
                    .map(|sig| (single.clone(), sig.clone()))
            }
            _ => None,
        }
    }

    /// Resolve an associated type (`Self.Item`) through the impl table.
    pub fn lookup_assoc(&self, trait_name: &str, ty: &Ty, assoc: &str) -> Option<Ty> {
        self.find_impl(trait_name, ty)
            .and_then(|i| i.assoc_bindings.get(assoc).cloned())
    }
}

fn head_matches(impl_ty: &Ty, ty: &Ty) -> bool {
    match (impl_ty.head_name(), ty.head_name()) {
        (Some(a), Some(b)) => a == b,
        _ => impl_ty == ty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string_impl(ty: Ty) -> TraitImplDef {
        let mut methods = FxHashMap::default();
        methods.insert(
            "to_string".to_string(),
            ImplMethodSig {
                param_count: 1,
                return_type: Ty::string(),
            },
        );
        TraitImplDef {
            trait_name: "Display".to_string(),
            impl_type: ty,
            methods,
            assoc_bindings: FxHashMap::default(),
        }
    }

    #[test]
    fn mangling_shape() {
        assert_eq!(
            mangle_trait_method("Display", "to_string", &Ty::Con("Point".into())),
            "Display__to_string__Point"
        );
        assert_eq!(
            mangle_trait_method("Display", "to_string", &Ty::list(Ty::int())),
            "Display__to_string__List"
        );
    }

    #[test]
    fn find_method_traits_matches_by_type() {
        let mut reg = TraitRegistry::new();
        reg.add_impl(to_string_impl(Ty::Con("Point".into())));
        reg.add_impl(to_string_impl(Ty::int()));
        let mut ctx = TyCtx::new();

        let found = reg.find_method_traits("to_string", &Ty::Con("Point".into()), &mut ctx);
        assert_eq!(found, vec!["Display"]);
        assert!(
            reg.find_method_traits("to_string", &Ty::Con("Nope".into()), &mut ctx)
                .is_empty()
        );
    }

    #[test]
    fn resolve_trait_method_returns_signature() {
        let mut reg = TraitRegistry::new();
        reg.add_impl(to_string_impl(Ty::Con("Point".into())));
        let mut ctx = TyCtx::new();
        let (trait_name, sig) = reg
            .resolve_trait_method("to_string", &Ty::Con("Point".into()), &mut ctx)
            .unwrap();
        assert_eq!(trait_name, "Display");
        assert_eq!(sig.param_count, 1);
        assert_eq!(sig.return_type, Ty::string());
    }

    #[test]
    fn assoc_type_resolves_through_impl() {
        let mut reg = TraitRegistry::new();
        let mut assoc = FxHashMap::default();
        assoc.insert("Output".to_string(), Ty::int());
        reg.add_impl(TraitImplDef {
            trait_name: "Add".to_string(),
            impl_type: Ty::int(),
            methods: FxHashMap::default(),
            assoc_bindings: assoc,
        });
        assert_eq!(
            reg.lookup_assoc("Add", &Ty::int(), "Output"),
            Some(Ty::int())
        );
        assert_eq!(reg.lookup_assoc("Add", &Ty::float(), "Output"), None);
    }
}
