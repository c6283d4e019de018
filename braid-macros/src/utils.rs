use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts a slice of tokens into a Rust source string.
///
/// Spaces are inserted between consecutive identifiers to avoid accidental
/// token merging (e.g. `foo bar` vs `foobar`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let needs_space = prev_was_ident && matches!(t, TokenTree::Ident(_));

        if needs_space {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_ident = matches!(t, TokenTree::Ident(_));
    }

    out
}

/// A function item annotated with one of the runtime's attributes.
pub(crate) struct AsyncFn {
    /// Tokens of the item, `async` removed and parameters emptied.
    pub(crate) tokens: Vec<TokenTree>,

    /// Position of the body block in `tokens`.
    pub(crate) body: usize,

    /// Pattern the root capability is bound to.
    pub(crate) binding: String,

    /// Whether the function declares a return type.
    pub(crate) returns: bool,
}

impl AsyncFn {
    /// Splits an `async fn` item into the parts the attributes rewrite.
    ///
    /// Returns `None` if the item has no body.
    pub(crate) fn parse(item: TokenStream) -> Option<Self> {
        let mut tokens: Vec<TokenTree> = item.into_iter().collect();

        if let Some(pos) = tokens
            .iter()
            .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
        {
            tokens.remove(pos);
        }

        let body = tokens
            .iter()
            .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))?;

        let name = tokens
            .iter()
            .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "fn"))
            .unwrap_or(0);

        let params = tokens
            .iter()
            .skip(name)
            .position(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Parenthesis))
            .map(|pos| pos + name);

        let mut binding = String::from("_");

        if let Some(pos) = params.filter(|pos| *pos < body) {
            if let TokenTree::Group(group) = &tokens[pos] {
                if let Some(name) = first_binding(group.stream()) {
                    binding = name;
                }
            }

            tokens[pos] = TokenTree::Group(Group::new(Delimiter::Parenthesis, TokenStream::new()));
        }

        let returns = tokens[..body].windows(2).any(|pair| {
            matches!(
                pair,
                [TokenTree::Punct(a), TokenTree::Punct(b)] if a.as_char() == '-' && b.as_char() == '>'
            )
        });

        Some(Self {
            tokens,
            body,
            binding,
            returns,
        })
    }

    /// Source of the original body.
    pub(crate) fn block(&self) -> String {
        match &self.tokens[self.body] {
            TokenTree::Group(g) => g.stream().to_string(),
            _ => String::new(),
        }
    }

    /// Replaces the body with `source`.
    pub(crate) fn replace_body(mut self, source: &str) -> Result<TokenStream, String> {
        let stream = source.parse::<TokenStream>().map_err(|err| err.to_string())?;

        self.tokens[self.body] = TokenTree::Group(Group::new(Delimiter::Brace, stream));
        Ok(self.tokens.into_iter().collect())
    }
}

/// Returns the identifier bound by the first parameter, skipping `mut`.
fn first_binding(params: TokenStream) -> Option<String> {
    let first = split_args(params).into_iter().next()?;

    first.iter().find_map(|t| match t {
        TokenTree::Ident(id) if id.to_string() != "mut" => Some(id.to_string()),
        _ => None,
    })
}

/// Emits a `compile_error!` carrying `msg`.
pub(crate) fn compile_error(msg: &str) -> TokenStream {
    format!("compile_error!({msg:?});")
        .parse()
        .unwrap_or_default()
}
