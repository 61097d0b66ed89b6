//! The unified kind set for tokens and CST nodes.

use mesh_lexer::TokenKind;

/// Every token kind and node kind in one u16 space, as rowan requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
#[allow(non_camel_case_types)]
pub enum SyntaxKind {
    // ── Tokens (mirror mesh_lexer::TokenKind) ───────────────────────────
    INT,
    FLOAT,
    STRING_START,
    STRING_CONTENT,
    STRING_END,
    TRIPLE_STRING_START,
    TRIPLE_STRING_END,
    INTERPOLATION_START,
    INTERPOLATION_END,
    IDENT,
    FN_KW,
    END_KW,
    DO_KW,
    STRUCT_KW,
    TYPE_KW,
    INTERFACE_KW,
    IMPL_KW,
    FOR_KW,
    IN_KW,
    WHEN_KW,
    CASE_KW,
    RECEIVE_KW,
    AFTER_KW,
    IMPORT_KW,
    FROM_KW,
    PUB_KW,
    LET_KW,
    IF_KW,
    ELSE_KW,
    TRUE_KW,
    FALSE_KW,
    AND_KW,
    OR_KW,
    NOT_KW,
    SELF_KW,
    SELF_TYPE_KW,
    SPAWN_KW,
    SEND_KW,
    RETURN_KW,
    MATCH_KW,
    TRAIT_KW,
    WHERE_KW,
    AS_KW,
    MUT_KW,
    LOOP_KW,
    WHILE_KW,
    BREAK_KW,
    CONTINUE_KW,
    DEFER_KW,
    TRY_KW,
    RAISE_KW,
    RESCUE_KW,
    ENSURE_KW,
    NIL_KW,
    USE_KW,
    MODULE_KW,
    TEST_KW,
    ASSERT_KW,
    PLUS,
    MINUS,
    STAR,
    SLASH,
    PERCENT,
    PLUS_PLUS,
    EQ_EQ,
    NOT_EQ,
    LT,
    GT,
    LT_EQ,
    GT_EQ,
    EQ,
    ARROW,
    COLON_COLON,
    COLON,
    DOT,
    COMMA,
    SEMICOLON,
    QUESTION,
    PIPE_GT,
    PIPE,
    L_PAREN,
    R_PAREN,
    L_BRACKET,
    R_BRACKET,
    L_BRACE,
    R_BRACE,
    NEWLINE,
    WHITESPACE,
    COMMENT,
    ERROR_TOKEN,
    EOF,

    // ── Nodes ───────────────────────────────────────────────────────────
    SOURCE_FILE,
    ERROR,

    // Items
    FN_DEF,
    STRUCT_DEF,
    SUM_TYPE_DEF,
    INTERFACE_DEF,
    IMPL_DEF,
    IMPORT_DECL,
    FROM_IMPORT_DECL,

    // Item parts
    VISIBILITY,
    NAME,
    NAME_REF,
    PATH,
    PARAM_LIST,
    PARAM,
    RETURN_TYPE,
    FIELD_DEF,
    VARIANT_DEF,
    DERIVING_CLAUSE,
    INTERFACE_METHOD,
    ASSOC_TYPE_DECL,
    ASSOC_TYPE_BINDING,

    // Types
    PATH_TYPE,
    TUPLE_TYPE,
    FN_TYPE,
    TYPE_ARG_LIST,

    // Statements / blocks
    BLOCK,
    LET_STMT,

    // Expressions
    LITERAL,
    STRING_EXPR,
    INTERPOLATION,
    BINARY_EXPR,
    UNARY_EXPR,
    CALL_EXPR,
    ARG_LIST,
    FIELD_ACCESS,
    PAREN_EXPR,
    TUPLE_EXPR,
    LIST_EXPR,
    IF_EXPR,
    CASE_EXPR,
    CASE_ARM,
    GUARD_CLAUSE,
    FOR_EXPR,
    LAMBDA_EXPR,
    RECEIVE_EXPR,
    AFTER_CLAUSE,
    SPAWN_EXPR,
    SEND_EXPR,
    RETURN_EXPR,
    TRY_EXPR,
    STRUCT_LIT,
    STRUCT_LIT_FIELD,

    // Patterns
    WILDCARD_PAT,
    IDENT_PAT,
    LITERAL_PAT,
    TUPLE_PAT,
    CONSTRUCTOR_PAT,
    OR_PAT,

    // Keep last; used for raw-kind bounds checking.
    __LAST,
}

impl SyntaxKind {
    pub fn from_raw(raw: u16) -> SyntaxKind {
        assert!(raw < SyntaxKind::__LAST as u16, "invalid SyntaxKind {raw}");
        // Safe by the assert: the enum is a dense repr(u16) range.
        unsafe { std::mem::transmute::<u16, SyntaxKind>(raw) }
    }

    pub fn is_trivia(self) -> bool {
        matches!(self, SyntaxKind::WHITESPACE | SyntaxKind::COMMENT)
    }
}

/// Map a lexer token kind into the unified kind space.
pub fn token_kind_to_syntax(kind: TokenKind) -> SyntaxKind {
    use SyntaxKind as S;
    use TokenKind as T;
    match kind {
        T::Int => S::INT,
        T::Float => S::FLOAT,
        T::StringStart => S::STRING_START,
        T::StringContent => S::STRING_CONTENT,
        T::StringEnd => S::STRING_END,
        T::TripleStringStart => S::TRIPLE_STRING_START,
        T::TripleStringEnd => S::TRIPLE_STRING_END,
        T::InterpolationStart => S::INTERPOLATION_START,
        T::InterpolationEnd => S::INTERPOLATION_END,
        T::Ident => S::IDENT,
        T::FnKw => S::FN_KW,
        T::EndKw => S::END_KW,
        T::DoKw => S::DO_KW,
        T::StructKw => S::STRUCT_KW,
        T::TypeKw => S::TYPE_KW,
        T::InterfaceKw => S::INTERFACE_KW,
        T::ImplKw => S::IMPL_KW,
        T::ForKw => S::FOR_KW,
        T::InKw => S::IN_KW,
        T::WhenKw => S::WHEN_KW,
        T::CaseKw => S::CASE_KW,
        T::ReceiveKw => S::RECEIVE_KW,
        T::AfterKw => S::AFTER_KW,
        T::ImportKw => S::IMPORT_KW,
        T::FromKw => S::FROM_KW,
        T::PubKw => S::PUB_KW,
        T::LetKw => S::LET_KW,
        T::IfKw => S::IF_KW,
        T::ElseKw => S::ELSE_KW,
        T::TrueKw => S::TRUE_KW,
        T::FalseKw => S::FALSE_KW,
        T::AndKw => S::AND_KW,
        T::OrKw => S::OR_KW,
        T::NotKw => S::NOT_KW,
        T::SelfKw => S::SELF_KW,
        T::SelfTypeKw => S::SELF_TYPE_KW,
        T::SpawnKw => S::SPAWN_KW,
        T::SendKw => S::SEND_KW,
        T::ReturnKw => S::RETURN_KW,
        T::MatchKw => S::MATCH_KW,
        T::TraitKw => S::TRAIT_KW,
        T::WhereKw => S::WHERE_KW,
        T::AsKw => S::AS_KW,
        T::MutKw => S::MUT_KW,
        T::LoopKw => S::LOOP_KW,
        T::WhileKw => S::WHILE_KW,
        T::BreakKw => S::BREAK_KW,
        T::ContinueKw => S::CONTINUE_KW,
        T::DeferKw => S::DEFER_KW,
        T::TryKw => S::TRY_KW,
        T::RaiseKw => S::RAISE_KW,
        T::RescueKw => S::RESCUE_KW,
        T::EnsureKw => S::ENSURE_KW,
        T::NilKw => S::NIL_KW,
        T::UseKw => S::USE_KW,
        T::ModuleKw => S::MODULE_KW,
        T::TestKw => S::TEST_KW,
        T::AssertKw => S::ASSERT_KW,
        T::Plus => S::PLUS,
        T::Minus => S::MINUS,
        T::Star => S::STAR,
        T::Slash => S::SLASH,
        T::Percent => S::PERCENT,
        T::PlusPlus => S::PLUS_PLUS,
        T::EqEq => S::EQ_EQ,
        T::NotEq => S::NOT_EQ,
        T::Lt => S::LT,
        T::Gt => S::GT,
        T::LtEq => S::LT_EQ,
        T::GtEq => S::GT_EQ,
        T::Eq => S::EQ,
        T::Arrow => S::ARROW,
        T::ColonColon => S::COLON_COLON,
        T::Colon => S::COLON,
        T::Dot => S::DOT,
        T::Comma => S::COMMA,
        T::Semicolon => S::SEMICOLON,
        T::Question => S::QUESTION,
        T::PipeGt => S::PIPE_GT,
        T::Pipe => S::PIPE,
        T::LParen => S::L_PAREN,
        T::RParen => S::R_PAREN,
        T::LBracket => S::L_BRACKET,
        T::RBracket => S::R_BRACKET,
        T::LBrace => S::L_BRACE,
        T::RBrace => S::R_BRACE,
        T::Newline => S::NEWLINE,
        T::Whitespace => S::WHITESPACE,
        T::Comment => S::COMMENT,
        T::Error => S::ERROR_TOKEN,
        T::Eof => S::EOF,
    }
}
