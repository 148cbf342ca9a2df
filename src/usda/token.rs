use logos::{Lexer, Logos};
use strum::EnumTryAs;

/// Strips `n` delimiter characters from both ends of the current slice.
fn unwrap_delimited<'a>(lex: &Lexer<'a, Token<'a>>, n: usize) -> &'a str {
    let slice = lex.slice();
    &slice[n..slice.len() - n]
}

/// Lexical tokens of the USDA text format.
///
/// The `#usda` header line is lexed as a comment; the parser checks it on
/// the raw source before tokenizing.
#[derive(Logos, Debug, Clone, PartialEq, EnumTryAs)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token<'a> {
    #[token("def")]
    Def,
    #[token("over")]
    Over,
    #[token("class")]
    Class,
    #[token("variantSet")]
    VariantSet,
    #[token("rel")]
    Rel,
    #[token("custom")]
    Custom,
    #[token("uniform")]
    Uniform,
    #[token("varying")]
    Varying,
    #[token("add")]
    Add,
    #[token("append")]
    Append,
    #[token("prepend")]
    Prepend,
    #[token("delete")]
    Delete,
    #[token("reorder")]
    Reorder,
    #[token("None")]
    None,

    /// Plain identifier, including array type names such as `asset[]`.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\[\])?", |lex| lex.slice())]
    Identifier(&'a str),

    /// `inputs:file`, `xformOp:translate.timeSamples`, `inputs:st.connect`.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(:[A-Za-z_][A-Za-z0-9_]*)+(\.[A-Za-z_]+)?", |lex| lex.slice())]
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*\.[A-Za-z_]+", |lex| lex.slice())]
    NamespacedIdentifier(&'a str),

    #[regex(r"[-+]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][-+]?[0-9]+)?", |lex| lex.slice())]
    #[token("-inf", |lex| lex.slice())]
    Number(&'a str),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unwrap_delimited(lex, 1))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unwrap_delimited(lex, 1))]
    #[regex(r#""""([^"]|"[^"]|""[^"])*""""#, |lex| unwrap_delimited(lex, 3))]
    String(&'a str),

    #[regex(r"@[^@\n]*@", |lex| unwrap_delimited(lex, 1))]
    #[regex(r"@@@([^@]|@[^@]|@@[^@])*@@@", |lex| unwrap_delimited(lex, 3))]
    AssetRef(&'a str),

    #[regex(r"<[^<>\n]*>", |lex| unwrap_delimited(lex, 1))]
    PathRef(&'a str),

    #[regex(r"[=,(){}\[\]:;&]", |lex| lex.slice().chars().next())]
    Punctuation(char),
}

/// Source spelling of keyword tokens, so they can double as names.
pub fn keyword_lexeme(token: &Token<'_>) -> Option<&'static str> {
    let lexeme = match token {
        Token::Def => "def",
        Token::Over => "over",
        Token::Class => "class",
        Token::VariantSet => "variantSet",
        Token::Rel => "rel",
        Token::Custom => "custom",
        Token::Uniform => "uniform",
        Token::Varying => "varying",
        Token::Add => "add",
        Token::Append => "append",
        Token::Prepend => "prepend",
        Token::Delete => "delete",
        Token::Reorder => "reorder",
        Token::None => "None",
        _ => return None,
    };
    Some(lexeme)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token<'_>> {
        Token::lexer(source).map(|t| t.expect("valid token")).collect()
    }

    #[test]
    fn lexes_prim_header() {
        let tokens = lex(r#"def Xform "World" ( kind = "component" ) {"#);
        assert_eq!(
            tokens,
            vec![
                Token::Def,
                Token::Identifier("Xform"),
                Token::String("World"),
                Token::Punctuation('('),
                Token::Identifier("kind"),
                Token::Punctuation('='),
                Token::String("component"),
                Token::Punctuation(')'),
                Token::Punctuation('{'),
            ]
        );
    }

    #[test]
    fn lexes_asset_and_path_refs() {
        let tokens = lex("@./geo.usd@</Root/Geo> @@@odd@name.usd@@@");
        assert_eq!(
            tokens,
            vec![
                Token::AssetRef("./geo.usd"),
                Token::PathRef("/Root/Geo"),
                Token::AssetRef("odd@name.usd"),
            ]
        );
    }

    #[test]
    fn lexes_namespaced_properties() {
        let tokens = lex("asset[] inputs:file float3 xformOp:translate.timeSamples inputs:st.connect");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("asset[]"),
                Token::NamespacedIdentifier("inputs:file"),
                Token::Identifier("float3"),
                Token::NamespacedIdentifier("xformOp:translate.timeSamples"),
                Token::NamespacedIdentifier("inputs:st.connect"),
            ]
        );
    }

    #[test]
    fn skips_comments_and_header() {
        let tokens = lex("#usda 1.0\n# comment\n-1.5e3 \"\"\"multi\nline\"\"\"");
        assert_eq!(tokens, vec![Token::Number("-1.5e3"), Token::String("multi\nline")]);
    }
}
