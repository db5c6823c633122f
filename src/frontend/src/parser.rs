use {
    super::{ast::*, lexer::Token},
    chumsky::prelude::{Parser as ChumskyParser, *},
};

pub(super) trait Parser<'tokens, 'src: 'tokens, Output>:
    ChumskyParser<'tokens, &'tokens [Token<'src>], Output, extra::Err<Rich<'tokens, Token<'src>>>>
    + Clone
    + 'tokens
{
}
impl<
        'tokens,
        'src: 'tokens,
        Output,
        T: ChumskyParser<
                'tokens,
                &'tokens [Token<'src>],
                Output,
                extra::Err<Rich<'tokens, Token<'src>>>,
            > + Clone
            + 'tokens,
    > Parser<'tokens, 'src, Output> for T
{
}

fn ident_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, &'src str> {
    select! { Token::Ident(ident) => ident }
}

fn int_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, i64> {
    select! { Token::IntLit(i) => i }.from_str().unwrapped()
}

fn str_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, &'src str> {
    select! { Token::Str(s) => s }
}

/// `int` followed by any number of `*`s. Variable declarations and `int`
/// function return types share this shape.
fn type_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, TypeExpr> {
    just(Token::Int).ignore_then(
        just(Token::Star)
            .repeated()
            .count()
            .map(|stars| (0..stars).fold(TypeExpr::Int, |ty, _| TypeExpr::Ptr(Box::new(ty)))),
    )
}

fn atom_parser<'tokens, 'src: 'tokens>(
    expr_parser: impl Parser<'tokens, 'src, Expr<'src>>,
) -> impl Parser<'tokens, 'src, Expr<'src>> {
    let call_expr = ident_parser()
        .then(
            expr_parser
                .clone()
                .separated_by(just(Token::Comma))
                .collect()
                .delimited_by(just(Token::OpenParen), just(Token::CloseParen)),
        )
        .map(|(func, args)| Expr::Call { func, args });

    choice((
        call_expr,
        ident_parser().map(Expr::Var),
        int_parser().map(Expr::Int),
        select! { Token::Char(c) => c }.map(|c| Expr::Int(c as i64)),
        str_parser().map(Expr::Str),
        expr_parser.delimited_by(just(Token::OpenParen), just(Token::CloseParen)),
    ))
    .boxed()
}

fn expr_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Expr<'src>> {
    recursive(|expr_parser| {
        #[derive(Clone)]
        enum Postfix<'src> {
            Index(Expr<'src>),
            Inc,
            Dec,
        }
        let postfix = atom_parser(expr_parser.clone()).foldl(
            choice((
                expr_parser
                    .clone()
                    .delimited_by(just(Token::OpenBracket), just(Token::CloseBracket))
                    .map(Postfix::Index),
                just(Token::PlusPlus).to(Postfix::Inc),
                just(Token::MinusMinus).to(Postfix::Dec),
            ))
            .repeated(),
            |base, postfix| match postfix {
                Postfix::Index(index) => Expr::Index {
                    base: Box::new(base),
                    index: Box::new(index),
                },
                Postfix::Inc => Expr::IncDec {
                    target: Box::new(base),
                    dec: false,
                    postfix: true,
                },
                Postfix::Dec => Expr::IncDec {
                    target: Box::new(base),
                    dec: true,
                    postfix: true,
                },
            },
        )
        .boxed();

        #[derive(Clone)]
        enum Prefix {
            Unary(UnaryOp),
            Inc,
            Dec,
        }
        let prec = choice((
            just(Token::Minus).to(Prefix::Unary(UnaryOp::Neg)),
            just(Token::Bang).to(Prefix::Unary(UnaryOp::LogicalNot)),
            just(Token::Tilde).to(Prefix::Unary(UnaryOp::BitNot)),
            just(Token::Star).to(Prefix::Unary(UnaryOp::Deref)),
            just(Token::Amp).to(Prefix::Unary(UnaryOp::AddrOf)),
            just(Token::PlusPlus).to(Prefix::Inc),
            just(Token::MinusMinus).to(Prefix::Dec),
        ))
        .repeated()
        .foldr(postfix, |prefix, operand| match prefix {
            Prefix::Unary(op) => Expr::Unary {
                op,
                operand: Box::new(operand),
            },
            Prefix::Inc => Expr::IncDec {
                target: Box::new(operand),
                dec: false,
                postfix: false,
            },
            Prefix::Dec => Expr::IncDec {
                target: Box::new(operand),
                dec: true,
                postfix: false,
            },
        })
        .boxed();

        // binary precedence tower, tightest first
        fn binary<'tokens, 'src: 'tokens, const N: usize>(
            operand: impl Parser<'tokens, 'src, Expr<'src>>,
            ops: [(Token<'src>, BinaryOp); N],
        ) -> impl Parser<'tokens, 'src, Expr<'src>> {
            operand.clone().foldl(
                choice(ops.map(|(token, op)| just(token).to(op)))
                    .then(operand)
                    .repeated(),
                |lhs, (op, rhs)| Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            )
            .boxed()
        }

        let prec = binary(
            prec,
            [
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
        );
        let prec = binary(
            prec,
            [(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
        );
        let prec = binary(
            prec,
            [(Token::Shl, BinaryOp::Shl), (Token::Shr, BinaryOp::Shr)],
        );
        let prec = binary(
            prec,
            [
                (Token::LtEq, BinaryOp::Le),
                (Token::GtEq, BinaryOp::Ge),
                (Token::Lt, BinaryOp::Lt),
                (Token::Gt, BinaryOp::Gt),
            ],
        );
        let prec = binary(
            prec,
            [(Token::EqEq, BinaryOp::Eq), (Token::BangEq, BinaryOp::Ne)],
        );
        let prec = binary(prec, [(Token::Amp, BinaryOp::BitAnd)]);
        let prec = binary(prec, [(Token::Caret, BinaryOp::BitXor)]);
        let prec = binary(prec, [(Token::Pipe, BinaryOp::BitOr)]);
        let prec = binary(prec, [(Token::AndAnd, BinaryOp::And)]);
        let prec = binary(prec, [(Token::OrOr, BinaryOp::Or)]);

        // assignment is right-associative and loosest
        prec.clone()
            .then(
                choice([
                    just(Token::Eq).to(AssignOp::Assign),
                    just(Token::PlusEq).to(AssignOp::Add),
                    just(Token::MinusEq).to(AssignOp::Sub),
                    just(Token::StarEq).to(AssignOp::Mul),
                    just(Token::SlashEq).to(AssignOp::Div),
                    just(Token::PercentEq).to(AssignOp::Rem),
                ])
                .then(expr_parser)
                .or_not(),
            )
            .map(|(target, assign)| match assign {
                Some((op, value)) => Expr::Assign {
                    target: Box::new(target),
                    op,
                    value: Box::new(value),
                },
                None => target,
            })
            .boxed()
    })
}

/// `int` + stars + name + optional `[N]` suffix + optional initializer.
/// The terminating `;` is consumed here so `for` can reuse this directly
/// as its init clause.
fn declare_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Stmt<'src>> {
    let init = choice((
        expr_parser()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect()
            .delimited_by(just(Token::OpenBrace), just(Token::CloseBrace))
            .map(Init::List),
        expr_parser().map(Init::Scalar),
    ));

    type_parser()
        .then(ident_parser())
        .then(
            int_parser()
                .delimited_by(just(Token::OpenBracket), just(Token::CloseBracket))
                .or_not(),
        )
        .then(just(Token::Eq).ignore_then(init).or_not())
        .then_ignore(just(Token::Semi))
        .map(|(((ty, name), len), init)| Stmt::Declare {
            name,
            ty: match len {
                Some(len) => TypeExpr::Array(Box::new(ty), Some(len as usize)),
                None => ty,
            },
            init,
        })
}

fn statement_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Stmt<'src>> {
    recursive(|statement_parser| {
        let block = statement_parser
            .clone()
            .repeated()
            .collect()
            .delimited_by(just(Token::OpenBrace), just(Token::CloseBrace))
            .map(Stmt::Block);

        let paren_cond =
            expr_parser().delimited_by(just(Token::OpenParen), just(Token::CloseParen));

        // `else` binds to the nearest unmatched `if`: the branch parser is
        // greedy, so the innermost `if` claims it first.
        let if_else = just(Token::If)
            .ignore_then(paren_cond.clone())
            .then(statement_parser.clone())
            .then(
                just(Token::Else)
                    .ignore_then(statement_parser.clone())
                    .or_not(),
            )
            .map(|((cond, then_branch), else_branch)| Stmt::If {
                cond,
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            });

        let r#while = just(Token::While)
            .ignore_then(paren_cond)
            .then(statement_parser.clone())
            .map(|(cond, body)| Stmt::While {
                cond,
                body: Box::new(body),
            });

        let for_init = choice((
            declare_parser(),
            expr_parser().then_ignore(just(Token::Semi)).map(Stmt::Expr),
        ))
        .map(Box::new)
        .map(Some)
        .or(just(Token::Semi).to(None));

        let r#for = just(Token::For)
            .ignore_then(
                for_init
                    .then(expr_parser().or_not().then_ignore(just(Token::Semi)))
                    .then(expr_parser().or_not())
                    .delimited_by(just(Token::OpenParen), just(Token::CloseParen)),
            )
            .then(statement_parser)
            .map(|(((init, cond), step), body)| Stmt::For {
                init,
                cond,
                step,
                body: Box::new(body),
            });

        let r#return = just(Token::Return)
            .ignore_then(expr_parser().or_not())
            .then_ignore(just(Token::Semi))
            .map(Stmt::Return);

        let expr_stmt = expr_parser().then_ignore(just(Token::Semi)).map(Stmt::Expr);

        let empty = just(Token::Semi).to(Stmt::Block(vec![]));

        choice((
            block,
            if_else,
            r#while,
            r#for,
            r#return,
            declare_parser(),
            expr_stmt,
            empty,
        ))
        .boxed()
    })
}

fn ret_type_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, TypeExpr> {
    type_parser().or(just(Token::Void).to(TypeExpr::Void))
}

fn param_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Param<'src>> {
    type_parser()
        .then(ident_parser())
        .then(
            just(Token::OpenBracket)
                .then(just(Token::CloseBracket))
                .or_not(),
        )
        .map(|((ty, name), brackets)| Param {
            name,
            ty: match brackets {
                Some(_) => TypeExpr::Array(Box::new(ty), None),
                None => ty,
            },
        })
}

fn func_def_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Item<'src>> {
    let params = choice((
        param_parser()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect(),
        // `f(void)` and `f()` both declare no parameters
        just(Token::Void).or_not().to(vec![]),
    ));

    ret_type_parser()
        .then(ident_parser())
        .then(params.delimited_by(just(Token::OpenParen), just(Token::CloseParen)))
        .then(
            statement_parser()
                .repeated()
                .collect()
                .delimited_by(just(Token::OpenBrace), just(Token::CloseBrace)),
        )
        .map(|(((ret, name), params), body)| {
            Item::Function(Function {
                name,
                ret,
                params,
                body,
            })
        })
}

fn global_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Item<'src>> {
    type_parser()
        .then(ident_parser())
        .then(
            int_parser()
                .delimited_by(just(Token::OpenBracket), just(Token::CloseBracket))
                .or_not(),
        )
        .then(just(Token::Eq).ignore_then(expr_parser()).or_not())
        .then_ignore(just(Token::Semi))
        .map(|(((ty, name), len), init)| Item::Global {
            name,
            ty: match len {
                Some(len) => TypeExpr::Array(Box::new(ty), Some(len as usize)),
                None => ty,
            },
            init,
        })
}

pub(super) fn ast_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Ast<'src>> {
    func_def_parser()
        .or(global_parser())
        .repeated()
        .collect()
        .map(|items| Ast { items })
        .then_ignore(end())
}
