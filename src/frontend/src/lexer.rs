use {
    chumsky::prelude::{Parser as ChumskyParser, *},
    derive_more::Display,
};

pub(super) trait Parser<'src, Output>:
    ChumskyParser<'src, &'src str, Output, extra::Err<Rich<'src, char>>> + Clone
{
}
impl<
        'src,
        Output,
        T: ChumskyParser<'src, &'src str, Output, extra::Err<Rich<'src, char>>> + Clone,
    > Parser<'src, Output> for T
{
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub enum Token<'src> {
    // delimiters
    #[display("{{")]
    OpenBrace,
    #[display("}}")]
    CloseBrace,
    #[display("[")]
    OpenBracket,
    #[display("]")]
    CloseBracket,
    #[display("(")]
    OpenParen,
    #[display(")")]
    CloseParen,
    #[display(",")]
    Comma,
    #[display(";")]
    Semi,
    // increment/decrement
    #[display("++")]
    PlusPlus,
    #[display("--")]
    MinusMinus,
    // assignment operators
    #[display("+=")]
    PlusEq,
    #[display("-=")]
    MinusEq,
    #[display("*=")]
    StarEq,
    #[display("/=")]
    SlashEq,
    #[display("%=")]
    PercentEq,
    // relational operators
    #[display("<=")]
    LtEq,
    #[display(">=")]
    GtEq,
    #[display("==")]
    EqEq,
    #[display("!=")]
    BangEq,
    // shifts
    #[display("<<")]
    Shl,
    #[display(">>")]
    Shr,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    // logical operators
    #[display("&&")]
    AndAnd,
    #[display("||")]
    OrOr,
    #[display("!")]
    Bang,
    // arithmetic and bitwise operators
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("%")]
    Percent,
    #[display("&")]
    Amp,
    #[display("|")]
    Pipe,
    #[display("^")]
    Caret,
    #[display("~")]
    Tilde,
    #[display("=")]
    Eq,
    // keywords
    #[display("int")]
    Int,
    #[display("void")]
    Void,
    #[display("return")]
    Return,
    #[display("if")]
    If,
    #[display("else")]
    Else,
    #[display("while")]
    While,
    #[display("for")]
    For,
    // literals
    IntLit(&'src str),
    #[display("'{_0}'")]
    Char(char),
    #[display("\"{_0}\"")]
    Str(&'src str),
    // identifiers
    Ident(&'src str),
}

fn delimiter_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    choice([
        just('{').to(Token::OpenBrace),
        just('}').to(Token::CloseBrace),
        just('[').to(Token::OpenBracket),
        just(']').to(Token::CloseBracket),
        just('(').to(Token::OpenParen),
        just(')').to(Token::CloseParen),
        just(',').to(Token::Comma),
        just(';').to(Token::Semi),
    ])
}

fn operator_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    choice([
        // increment/decrement before the compound assignments
        just("++").to(Token::PlusPlus),
        just("--").to(Token::MinusMinus),
        // assignment operators
        just("+=").to(Token::PlusEq),
        just("-=").to(Token::MinusEq),
        just("*=").to(Token::StarEq),
        just("/=").to(Token::SlashEq),
        just("%=").to(Token::PercentEq),
        // relational operators
        just("<=").to(Token::LtEq),
        just(">=").to(Token::GtEq),
        just("==").to(Token::EqEq),
        just("!=").to(Token::BangEq),
        // shifts before the single-character relationals
        just("<<").to(Token::Shl),
        just(">>").to(Token::Shr),
        just("<").to(Token::Lt),
        just(">").to(Token::Gt),
        // logical operators
        just("&&").to(Token::AndAnd),
        just("||").to(Token::OrOr),
        just("!").to(Token::Bang),
        // arithmetic and bitwise operators
        just("+").to(Token::Plus),
        just("-").to(Token::Minus),
        just("*").to(Token::Star),
        just("/").to(Token::Slash),
        just("%").to(Token::Percent),
        just("&").to(Token::Amp),
        just("|").to(Token::Pipe),
        just("^").to(Token::Caret),
        just("~").to(Token::Tilde),
        just("=").to(Token::Eq),
    ])
}

fn char_escape_lexer<'src>() -> impl Parser<'src, char> {
    just('\\').ignore_then(choice([
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
        just('\\').to('\\'),
        just('"').to('"'),
        just('\'').to('\''),
        just('0').to('\0'),
    ]))
}

fn string_literal_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    none_of("\"\\")
        .or(char_escape_lexer())
        .repeated()
        .to_slice()
        .delimited_by(just('"'), just('"'))
        .map(Token::Str)
}

fn char_literal_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    just('\'')
        .ignore_then(none_of("'\\").or(char_escape_lexer()))
        .then_ignore(just('\''))
        .map(Token::Char)
}

fn int_literal_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    text::int(10).map(Token::IntLit)
}

fn ident_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    text::ascii::ident().map(|ident| match ident {
        "int" => Token::Int,
        "void" => Token::Void,
        "return" => Token::Return,
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "for" => Token::For,
        _ => Token::Ident(ident),
    })
}

fn token_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    choice((
        delimiter_lexer(),
        operator_lexer(),
        string_literal_lexer(),
        char_literal_lexer(),
        int_literal_lexer(),
        ident_lexer(),
    ))
}

// `#` lines are skipped wholesale; the sources only use `#include`,
// which contributes nothing past the lexer.
fn trivia_lexer<'src>() -> impl Parser<'src, ()> {
    choice((
        just("//").then(none_of('\n').repeated()).ignored(),
        just("/*")
            .then(any().and_is(just("*/").not()).repeated())
            .then(just("*/"))
            .ignored(),
        just("#").then(none_of('\n').repeated()).ignored(),
    ))
    .padded()
    .ignored()
}

pub(super) fn lexer<'src>() -> impl Parser<'src, Vec<Token<'src>>> {
    token_lexer()
        .padded_by(trivia_lexer().repeated())
        .padded()
        .repeated()
        .collect()
        .then_ignore(end())
}
