use super::{
    Alternative, Atom, Block, Element, Grammar, GrammarKind, LexerCommand, RepeatKind, Rule,
    Suffix,
};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{escaped, escaped_transform, is_not, tag, take, take_until, take_while_m_n},
    character::complete::{alpha1, alphanumeric1, anychar, char, multispace1, none_of},
    combinator::{consumed, cut, eof, map, map_opt, map_res, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated},
};
use nom_locate::LocatedSpan;

type Span<'a> = LocatedSpan<&'a str>;

#[derive(Debug, Clone)]
enum Item {
    Import(Vec<String>),
    Rule(Rule),
    Skipped,
}

/// Parses a whole grammar file, returning the byte offset of the failure on error.
pub(super) fn parse(source: &str) -> Result<Grammar, usize> {
    match grammar_file(Span::new(source)) {
        Ok((_, grammar)) => Ok(Grammar {
            source: source.to_string(),
            ..grammar
        }),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e.input.location_offset()),
        Err(nom::Err::Incomplete(_)) => Err(source.len()),
    }
}

fn grammar_file(input: Span) -> IResult<Span, Grammar> {
    let (input, (kind, name)) = preceded(ws, header).parse(input)?;
    let (input, items) = many0(preceded(
        ws,
        alt((
            map(import, Item::Import),
            value(Item::Skipped, prequel),
            value(Item::Skipped, action),
            value(Item::Skipped, mode),
            map(rule, Item::Rule),
        )),
    ))
    .parse(input)?;
    let (input, _) = preceded(ws, eof).parse(input)?;

    let mut grammar = Grammar {
        name,
        kind,
        ..Grammar::default()
    };
    for item in items {
        match item {
            Item::Import(names) => grammar.imports.extend(names),
            Item::Rule(rule) if rule.is_lexer_rule() => grammar.lexer_rules.push(rule),
            Item::Rule(rule) => grammar.parser_rules.push(rule),
            Item::Skipped => {}
        }
    }
    Ok((input, grammar))
}

fn line_comment(input: Span) -> IResult<Span, Span> {
    recognize(pair(tag("//"), opt(is_not("\r\n")))).parse(input)
}

fn block_comment(input: Span) -> IResult<Span, Span> {
    recognize((tag("/*"), take_until("*/"), tag("*/"))).parse(input)
}

/// Whitespace and comments.
fn ws(input: Span) -> IResult<Span, ()> {
    value((), many0(alt((multispace1, line_comment, block_comment)))).parse(input)
}

fn symbol<'a>(s: &'static str) -> impl FnMut(Span<'a>) -> IResult<Span<'a>, Span<'a>> {
    move |input| preceded(ws, tag(s)).parse(input)
}

fn ident(input: Span) -> IResult<Span, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| span.fragment().to_string(),
    )
    .parse(input)
}

fn header(input: Span) -> IResult<Span, (GrammarKind, String)> {
    let (input, kind) = opt(terminated(
        alt((
            value(GrammarKind::Parser, tag("parser")),
            value(GrammarKind::Lexer, tag("lexer")),
        )),
        multispace1,
    ))
    .parse(input)?;
    let (input, _) = tag("grammar").parse(input)?;
    let (input, name) = preceded(ws, ident).parse(input)?;
    let (input, _) = symbol(";").parse(input)?;
    Ok((input, (kind.unwrap_or_default(), name)))
}

fn import(input: Span) -> IResult<Span, Vec<String>> {
    delimited(
        terminated(tag("import"), multispace1),
        separated_list1(symbol(","), preceded(ws, ident)),
        symbol(";"),
    )
    .parse(input)
}

/// `options`, `tokens` and `channels` blocks.
fn prequel(input: Span) -> IResult<Span, Span> {
    preceded(
        (alt((tag("options"), tag("tokens"), tag("channels"))), ws),
        braced,
    )
    .parse(input)
}

/// Named actions such as `@header { ... }` or `@parser::members { ... }`.
fn action(input: Span) -> IResult<Span, Span> {
    preceded((char('@'), ident, opt((tag("::"), ident)), ws), braced).parse(input)
}

fn mode(input: Span) -> IResult<Span, String> {
    delimited(terminated(tag("mode"), multispace1), ident, symbol(";")).parse(input)
}

/// A `{ ... }` region with balanced braces.
fn braced(input: Span) -> IResult<Span, Span> {
    let mut depth = 0usize;
    let mut end = None;
    for (i, c) in input.fragment().char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 1 => {
                end = Some(i + 1);
                break;
            }
            '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => break,
            _ => {}
        }
    }

    match end {
        Some(len) => take(len).parse(input),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        ))),
    }
}

fn rule(input: Span) -> IResult<Span, Rule> {
    let (input, (text, (fragment, name, body))) = consumed(rule_parts).parse(input)?;
    let start_line = text.location_line();
    let end_line = start_line + text.fragment().matches('\n').count() as u32;
    Ok((
        input,
        Rule {
            name,
            fragment,
            body,
            text: text.fragment().to_string(),
            start_line,
            end_line,
        },
    ))
}

fn rule_parts(input: Span) -> IResult<Span, (bool, String, Block)> {
    let (input, fragment) = opt(terminated(tag("fragment"), multispace1)).parse(input)?;
    let (input, name) = ident(input)?;
    let (input, _) = symbol(":").parse(input)?;
    let (input, body) = cut(terminated(block, symbol(";"))).parse(input)?;
    Ok((input, (fragment.is_some(), name, body)))
}

fn block(input: Span) -> IResult<Span, Block> {
    map(separated_list1(symbol("|"), alternative), |alternatives| Block {
        alternatives,
    })
    .parse(input)
}

fn alternative(input: Span) -> IResult<Span, Alternative> {
    let (input, elements) = many0(element).parse(input)?;
    let (input, commands) = opt(preceded(
        symbol("->"),
        separated_list1(symbol(","), preceded(ws, command)),
    ))
    .parse(input)?;
    let (input, label) = opt(preceded(symbol("#"), preceded(ws, ident))).parse(input)?;
    Ok((
        input,
        Alternative {
            elements,
            label,
            commands: commands.unwrap_or_default(),
        },
    ))
}

fn command(input: Span) -> IResult<Span, LexerCommand> {
    map(
        pair(
            ident,
            opt(delimited(symbol("("), preceded(ws, ident), symbol(")"))),
        ),
        |(name, argument)| match argument {
            _ if name == "skip" => LexerCommand::Skip,
            Some(channel) if name == "channel" => LexerCommand::Channel(channel),
            Some(argument) => LexerCommand::Other(format!("{}({})", name, argument)),
            None => LexerCommand::Other(name),
        },
    )
    .parse(input)
}

fn element(input: Span) -> IResult<Span, Element> {
    let (input, _) = ws(input)?;
    let (input, label) =
        opt(terminated(ident, pair(ws, alt((tag("+="), tag("=")))))).parse(input)?;
    let (input, atom) = preceded(ws, atom).parse(input)?;
    let (input, suffix) = opt(suffix).parse(input)?;
    Ok((input, Element { label, atom, suffix }))
}

fn suffix(input: Span) -> IResult<Span, Suffix> {
    map(
        pair(
            alt((
                value(RepeatKind::OneOrMore, char('+')),
                value(RepeatKind::ZeroOrMore, char('*')),
                value(RepeatKind::Optional, char('?')),
            )),
            opt(char('?')),
        ),
        |(kind, lazy)| Suffix {
            kind,
            greedy: lazy.is_none(),
        },
    )
    .parse(input)
}

fn atom(input: Span) -> IResult<Span, Atom> {
    alt((
        map(delimited(char('('), block, symbol(")")), Atom::Block),
        map_opt(
            separated_pair(literal, symbol(".."), preceded(ws, literal)),
            |(from, to)| match (single_char(&from), single_char(&to)) {
                (Some(from), Some(to)) => Some(Atom::Range(from, to)),
                _ => None,
            },
        ),
        map(literal, Atom::Literal),
        map(set, |content: Span| Atom::Set(content.fragment().to_string())),
        map(preceded(char('~'), preceded(ws, atom)), |inner| {
            Atom::Not(Box::new(inner))
        }),
        value(Atom::Wildcard, char('.')),
        map(ident, |name| {
            if name.starts_with(|c: char| c.is_ascii_uppercase()) {
                Atom::TokenRef(name)
            } else {
                Atom::RuleRef(name)
            }
        }),
    ))
    .parse(input)
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn unicode(input: Span) -> IResult<Span, char> {
    map_opt(
        map_res(
            preceded(
                char('u'),
                alt((
                    delimited(
                        char('{'),
                        take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()),
                        char('}'),
                    ),
                    take_while_m_n(4, 4, |c: char| c.is_ascii_hexdigit()),
                )),
            ),
            |span: Span| u32::from_str_radix(span.fragment(), 16),
        ),
        char::from_u32,
    )
    .parse(input)
}

fn literal(input: Span) -> IResult<Span, String> {
    delimited(
        char('\''),
        escaped_transform(
            none_of("\\'"),
            '\\',
            alt((
                value('\\', char('\\')),
                value('\'', char('\'')),
                value('\n', char('n')),
                value('\r', char('r')),
                value('\t', char('t')),
                value('\u{8}', char('b')),
                value('\u{c}', char('f')),
                unicode,
            )),
        ),
        char('\''),
    )
    .parse(input)
}

/// Raw contents of a `[...]` character set; escapes are kept as written.
fn set(input: Span) -> IResult<Span, Span> {
    delimited(char('['), escaped(none_of("\\]"), '\\', anychar), char(']')).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse_atom(s: &str) -> Atom {
        atom(Span::new(s)).unwrap().1
    }

    #[rstest]
    #[case("'a'..'z'", Atom::Range('a', 'z'))]
    #[case("'abc'", Atom::Literal("abc".to_string()))]
    #[case("[a-z\\]]", Atom::Set("a-z\\]".to_string()))]
    #[case(".", Atom::Wildcard)]
    #[case("ID", Atom::TokenRef("ID".to_string()))]
    #[case("expr", Atom::RuleRef("expr".to_string()))]
    #[case("'\\u0041'", Atom::Literal("A".to_string()))]
    fn test_atom(#[case] source: &str, #[case] expected: Atom) {
        assert_eq!(parse_atom(source), expected);
    }

    #[test]
    fn test_nested_block_and_not() {
        match parse_atom("~('a' | 'b')") {
            Atom::Not(inner) => match *inner {
                Atom::Block(block) => assert_eq!(block.alternatives.len(), 2),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_alternative() {
        let (_, block) = block(Span::new("'a' | ;")).unwrap();
        assert_eq!(block.alternatives.len(), 2);
        assert!(block.alternatives[1].elements.is_empty());
    }

    #[test]
    fn test_skips_actions_and_modes() {
        let grammar = parse(
            "lexer grammar L;\n@header { package { nested } }\nmode INSIDE;\nA : 'a' ;",
        )
        .unwrap();
        assert_eq!(grammar.lexer_rules.len(), 1);
    }
}
