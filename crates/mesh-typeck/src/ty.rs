//! Core type representation.

use std::fmt;

/// A type. Variables are dense u32 indices into the checker's
/// unification table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    /// Unification variable.
    Var(u32),
    /// Nullary type constructor (`Int`, `String`, `Point`, ...).
    Con(String),
    /// Applied type constructor (`List<Int>`, `Result<T, E>`, ...).
    App(String, Vec<Ty>),
    /// Function type.
    Fun(Vec<Ty>, Box<Ty>),
    /// Tuple type. The empty tuple is Unit.
    Tuple(Vec<Ty>),
}

impl Ty {
    pub fn unit() -> Ty {
        Ty::Tuple(Vec::new())
    }

    pub fn int() -> Ty {
        Ty::Con("Int".into())
    }

    pub fn float() -> Ty {
        Ty::Con("Float".into())
    }

    pub fn bool() -> Ty {
        Ty::Con("Bool".into())
    }

    pub fn string() -> Ty {
        Ty::Con("String".into())
    }

    pub fn pid() -> Ty {
        Ty::Con("Pid".into())
    }

    pub fn list(elem: Ty) -> Ty {
        Ty::App("List".into(), vec![elem])
    }

    pub fn option(inner: Ty) -> Ty {
        Ty::App("Option".into(), vec![inner])
    }

    pub fn result(ok: Ty, err: Ty) -> Ty {
        Ty::App("Result".into(), vec![ok, err])
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Ty::Tuple(items) if items.is_empty())
    }

    /// The head constructor name, used for trait-impl matching and
    /// `Trait__Method__Type` mangling.
    pub fn head_name(&self) -> Option<&str> {
        match self {
            Ty::Con(name) | Ty::App(name, _) => Some(name),
            _ => None,
        }
    }

    /// Collect free variables into `out`, in first-occurrence order.
    pub fn free_vars(&self, out: &mut Vec<u32>) {
        match self {
            Ty::Var(v) => {
                if !out.contains(v) {
                    out.push(*v);
                }
            }
            Ty::Con(_) => {}
            Ty::App(_, args) | Ty::Tuple(args) => {
                for a in args {
                    a.free_vars(out);
                }
            }
            Ty::Fun(params, ret) => {
                for p in params {
                    p.free_vars(out);
                }
                ret.free_vars(out);
            }
        }
    }

    pub fn contains_var(&self, var: u32) -> bool {
        match self {
            Ty::Var(v) => *v == var,
            Ty::Con(_) => false,
            Ty::App(_, args) | Ty::Tuple(args) => args.iter().any(|a| a.contains_var(var)),
            Ty::Fun(params, ret) => {
                params.iter().any(|p| p.contains_var(var)) || ret.contains_var(var)
            }
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Var(v) => write!(f, "t{v}"),
            Ty::Con(name) => write!(f, "{name}"),
            Ty::App(name, args) => {
                write!(f, "{name}<")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ">")
            }
            Ty::Fun(params, ret) => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
            Ty::Tuple(items) if items.is_empty() => write!(f, "Unit"),
            Ty::Tuple(items) => {
                write!(f, "(")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A polymorphic type scheme: `vars` are bound, everything else is free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    pub vars: Vec<u32>,
    pub ty: Ty,
}

impl Scheme {
    /// A monomorphic scheme binding nothing.
    pub fn mono(ty: Ty) -> Scheme {
        Scheme {
            vars: Vec::new(),
            ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Ty::list(Ty::int()).to_string(), "List<Int>");
        assert_eq!(
            Ty::Fun(vec![Ty::int(), Ty::string()], Box::new(Ty::bool())).to_string(),
            "fn(Int, String) -> Bool"
        );
        assert_eq!(Ty::unit().to_string(), "Unit");
    }

    #[test]
    fn free_vars_in_order() {
        let ty = Ty::Fun(
            vec![Ty::Var(3), Ty::Var(1)],
            Box::new(Ty::Tuple(vec![Ty::Var(3), Ty::Var(2)])),
        );
        let mut vars = Vec::new();
        ty.free_vars(&mut vars);
        assert_eq!(vars, vec![3, 1, 2]);
    }
}
