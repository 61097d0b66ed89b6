//! Item-level AST nodes.

use super::{AstNode, Block, Expr, ast_node, child, children, token};
use crate::syntax_kind::SyntaxKind;
use crate::{SyntaxNode, SyntaxToken};

/// A top-level (or impl-nested) declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    FnDef(FnDef),
    StructDef(StructDef),
    SumTypeDef(SumTypeDef),
    InterfaceDef(InterfaceDef),
    ImplDef(ImplDef),
    ImportDecl(ImportDecl),
    FromImportDecl(FromImportDecl),
    LetStmt(LetStmt),
}

impl Item {
    pub fn cast(syntax: SyntaxNode) -> Option<Item> {
        use SyntaxKind::*;
        Some(match syntax.kind() {
            FN_DEF => Item::FnDef(FnDef { syntax }),
            STRUCT_DEF => Item::StructDef(StructDef { syntax }),
            SUM_TYPE_DEF => Item::SumTypeDef(SumTypeDef { syntax }),
            INTERFACE_DEF => Item::InterfaceDef(InterfaceDef { syntax }),
            IMPL_DEF => Item::ImplDef(ImplDef { syntax }),
            IMPORT_DECL => Item::ImportDecl(ImportDecl { syntax }),
            FROM_IMPORT_DECL => Item::FromImportDecl(FromImportDecl { syntax }),
            LET_STMT => Item::LetStmt(LetStmt { syntax }),
            _ => return None,
        })
    }

    pub fn syntax(&self) -> &SyntaxNode {
        match self {
            Item::FnDef(it) => it.syntax(),
            Item::StructDef(it) => it.syntax(),
            Item::SumTypeDef(it) => it.syntax(),
            Item::InterfaceDef(it) => it.syntax(),
            Item::ImplDef(it) => it.syntax(),
            Item::ImportDecl(it) => it.syntax(),
            Item::FromImportDecl(it) => it.syntax(),
            Item::LetStmt(it) => it.syntax(),
        }
    }

    /// The `pub` marker, if present. `None` means module-private.
    pub fn visibility(&self) -> Option<super::Visibility> {
        child(self.syntax())
    }

    /// The declared name for named items.
    pub fn name(&self) -> Option<super::Name> {
        match self {
            Item::FnDef(it) => it.name(),
            Item::StructDef(it) => it.name(),
            Item::SumTypeDef(it) => it.name(),
            Item::InterfaceDef(it) => it.name(),
            Item::LetStmt(it) => it.name(),
            Item::ImplDef(_) | Item::ImportDecl(_) | Item::FromImportDecl(_) => None,
        }
    }
}

// ── Functions ───────────────────────────────────────────────────────────

ast_node!(FnDef, FN_DEF);
ast_node!(ParamList, PARAM_LIST);
ast_node!(Param, PARAM);
ast_node!(ReturnType, RETURN_TYPE);

impl FnDef {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn visibility(&self) -> Option<super::Visibility> {
        child(&self.syntax)
    }

    pub fn param_list(&self) -> Option<ParamList> {
        child(&self.syntax)
    }

    pub fn return_type(&self) -> Option<ReturnType> {
        child(&self.syntax)
    }

    pub fn body(&self) -> Option<Block> {
        child(&self.syntax)
    }
}

impl ParamList {
    pub fn params(&self) -> impl Iterator<Item = Param> + use<> {
        children(&self.syntax)
    }
}

impl Param {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn ty(&self) -> Option<TypeRef> {
        self.syntax.children().find_map(TypeRef::cast)
    }

    pub fn is_self(&self) -> bool {
        token(&self.syntax, SyntaxKind::SELF_KW).is_some()
    }
}

impl ReturnType {
    pub fn ty(&self) -> Option<TypeRef> {
        self.syntax.children().find_map(TypeRef::cast)
    }
}

// ── Structs and sum types ───────────────────────────────────────────────

ast_node!(StructDef, STRUCT_DEF);
ast_node!(FieldDef, FIELD_DEF);
ast_node!(SumTypeDef, SUM_TYPE_DEF);
ast_node!(VariantDef, VARIANT_DEF);
ast_node!(DerivingClause, DERIVING_CLAUSE);

impl StructDef {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn visibility(&self) -> Option<super::Visibility> {
        child(&self.syntax)
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldDef> + use<> {
        children(&self.syntax)
    }

    pub fn deriving(&self) -> Option<DerivingClause> {
        child(&self.syntax)
    }
}

impl FieldDef {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn ty(&self) -> Option<TypeRef> {
        self.syntax.children().find_map(TypeRef::cast)
    }
}

impl SumTypeDef {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn visibility(&self) -> Option<super::Visibility> {
        child(&self.syntax)
    }

    pub fn variants(&self) -> impl Iterator<Item = VariantDef> + use<> {
        children(&self.syntax)
    }

    pub fn deriving(&self) -> Option<DerivingClause> {
        child(&self.syntax)
    }
}

impl VariantDef {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn field_types(&self) -> impl Iterator<Item = TypeRef> + use<> {
        self.syntax.children().filter_map(TypeRef::cast)
    }
}

impl DerivingClause {
    /// The derived trait names, in clause order. An empty list is the
    /// explicit `deriving()` (derive nothing) form.
    pub fn traits(&self) -> Vec<String> {
        children::<super::NameRef>(&self.syntax)
            .map(|n| n.text())
            .collect()
    }
}

// ── Interfaces and impls ────────────────────────────────────────────────

ast_node!(InterfaceDef, INTERFACE_DEF);
ast_node!(InterfaceMethod, INTERFACE_METHOD);
ast_node!(AssocTypeDecl, ASSOC_TYPE_DECL);
ast_node!(ImplDef, IMPL_DEF);
ast_node!(AssocTypeBinding, ASSOC_TYPE_BINDING);

impl InterfaceDef {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn visibility(&self) -> Option<super::Visibility> {
        child(&self.syntax)
    }

    pub fn methods(&self) -> impl Iterator<Item = InterfaceMethod> + use<> {
        children(&self.syntax)
    }

    pub fn assoc_types(&self) -> impl Iterator<Item = AssocTypeDecl> + use<> {
        children(&self.syntax)
    }
}

impl InterfaceMethod {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn param_list(&self) -> Option<ParamList> {
        child(&self.syntax)
    }

    pub fn return_type(&self) -> Option<ReturnType> {
        child(&self.syntax)
    }

    /// Default method body, when the interface provides one.
    pub fn default_body(&self) -> Option<Block> {
        child(&self.syntax)
    }
}

impl AssocTypeDecl {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }
}

impl ImplDef {
    /// `impl Trait for Type`: the trait path.
    pub fn trait_path(&self) -> Option<super::Path> {
        children::<super::Path>(&self.syntax).next()
    }

    /// `impl Trait for Type`: the implementing type path.
    pub fn type_path(&self) -> Option<super::Path> {
        children::<super::Path>(&self.syntax).nth(1)
    }

    pub fn methods(&self) -> impl Iterator<Item = FnDef> + use<> {
        children(&self.syntax)
    }

    pub fn assoc_bindings(&self) -> impl Iterator<Item = AssocTypeBinding> + use<> {
        children(&self.syntax)
    }
}

impl AssocTypeBinding {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn ty(&self) -> Option<TypeRef> {
        self.syntax.children().find_map(TypeRef::cast)
    }
}

// ── Imports ─────────────────────────────────────────────────────────────

ast_node!(ImportDecl, IMPORT_DECL);
ast_node!(FromImportDecl, FROM_IMPORT_DECL);

impl ImportDecl {
    pub fn module_path(&self) -> Option<super::Path> {
        child(&self.syntax)
    }
}

impl FromImportDecl {
    pub fn module_path(&self) -> Option<super::Path> {
        child(&self.syntax)
    }

    pub fn names(&self) -> impl Iterator<Item = super::NameRef> + use<> {
        children(&self.syntax)
    }
}

// ── Let bindings ────────────────────────────────────────────────────────

ast_node!(LetStmt, LET_STMT);

impl LetStmt {
    pub fn name(&self) -> Option<super::Name> {
        child(&self.syntax)
    }

    pub fn value(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }
}

// ── Type references ─────────────────────────────────────────────────────

/// A textual type annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Path(PathType),
    Tuple(TupleType),
    Fn(FnType),
}

ast_node!(PathType, PATH_TYPE);
ast_node!(TupleType, TUPLE_TYPE);
ast_node!(FnType, FN_TYPE);
ast_node!(TypeArgList, TYPE_ARG_LIST);

impl TypeRef {
    pub fn cast(syntax: SyntaxNode) -> Option<TypeRef> {
        use SyntaxKind::*;
        Some(match syntax.kind() {
            PATH_TYPE => TypeRef::Path(PathType { syntax }),
            TUPLE_TYPE => TypeRef::Tuple(TupleType { syntax }),
            FN_TYPE => TypeRef::Fn(FnType { syntax }),
            _ => return None,
        })
    }

    pub fn syntax(&self) -> &SyntaxNode {
        match self {
            TypeRef::Path(it) => it.syntax(),
            TypeRef::Tuple(it) => it.syntax(),
            TypeRef::Fn(it) => it.syntax(),
        }
    }
}

impl PathType {
    pub fn path(&self) -> Option<super::Path> {
        child(&self.syntax)
    }

    pub fn type_args(&self) -> Option<TypeArgList> {
        child(&self.syntax)
    }
}

impl TypeArgList {
    pub fn args(&self) -> impl Iterator<Item = TypeRef> + use<> {
        self.syntax.children().filter_map(TypeRef::cast)
    }
}

impl TupleType {
    pub fn items(&self) -> impl Iterator<Item = TypeRef> + use<> {
        self.syntax.children().filter_map(TypeRef::cast)
    }
}

impl FnType {
    /// Parameter types followed by the return type (the last child).
    pub fn types(&self) -> impl Iterator<Item = TypeRef> + use<> {
        self.syntax.children().filter_map(TypeRef::cast)
    }

    pub fn has_arrow(&self) -> bool {
        token(&self.syntax, SyntaxKind::ARROW).is_some()
    }
}

/// Token helper shared by LSP features: the significant token covering an
/// offset, if any.
pub fn token_at_offset(node: &SyntaxNode, offset: u32) -> Option<SyntaxToken> {
    node.token_at_offset(rowan::TextSize::from(offset))
        .right_biased()
}
