//! Attribute macros for the braid runtime.
//!
//! - `#[braid::main]` turns an `async fn main` into a synchronous entry
//!   point driving a real-time runtime.
//! - `#[braid::test]` turns an `async fn` into a `#[test]` driving a
//!   virtual-time runtime.
//!
//! The first parameter of the annotated function, if any, names the root
//! capability (`Cx`) inside the body:
//!
//! ```rust,ignore
//! #[braid::test]
//! async fn waits(cx: Cx) {
//!     wait(&cx, Duration::from_secs(5)).await?;
//! }
//! ```
//!
//! Bodies may use `?` on runtime errors. A function without a return type
//! panics if the computation fails; one with a return type returns the
//! computation's `braid::Result`.

mod utils;

use proc_macro::TokenStream;
use utils::AsyncFn;

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut builder = String::from("::braid::RuntimeBuilder::new()");

    for arg in utils::split_args(attr) {
        let arg = utils::tokens_to_string(&arg);
        let arg = arg.trim();

        if arg == "virtual_time" {
            builder.push_str(".virtual_time()");
        } else if let Some(value) = arg.strip_prefix("wait_threshold_ms") {
            let value = value.trim_start().trim_start_matches('=').trim();

            match value.parse::<u64>() {
                Ok(ms) => builder.push_str(&format!(
                    ".wait_threshold(::std::time::Duration::from_millis({ms}))"
                )),
                Err(_) => return utils::compile_error("wait_threshold_ms expects an integer"),
            }
        } else {
            return utils::compile_error(&format!("unknown braid::main argument `{arg}`"));
        }
    }

    builder.push_str(".build()");

    expand(item, &builder, None)
}

#[proc_macro_attribute]
pub fn test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let builder = "::braid::RuntimeBuilder::new().virtual_time().build()";
    let test_attr = "#[test]".parse::<TokenStream>().unwrap_or_default();

    expand(item, builder, Some(test_attr))
}

/// Rewrites the body of `item` into a `block_on` call on the runtime built
/// by `builder`.
fn expand(item: TokenStream, builder: &str, prefix: Option<TokenStream>) -> TokenStream {
    let Some(function) = AsyncFn::parse(item) else {
        return utils::compile_error("expected an `async fn` with a body");
    };

    let block = function.block();
    let binding = function.binding.clone();

    let source = if function.returns {
        format!(
            "{{
                let runtime = {builder};
                runtime.block_on(|{binding}| async move {{ {block} }})
            }}"
        )
    } else {
        format!(
            "{{
                let runtime = {builder};
                let outcome = runtime.block_on(|{binding}| async move {{
                    {{ {block} }};
                    ::std::result::Result::Ok::<(), ::braid::Error>(())
                }});

                if let ::std::result::Result::Err(error) = outcome {{
                    panic!(\"braid runtime failed: {{error}}\");
                }}
            }}"
        )
    };

    let expanded = match function.replace_body(&source) {
        Ok(expanded) => expanded,
        Err(err) => return utils::compile_error(&format!("braid macro error: {err}")),
    };

    let mut result = prefix.unwrap_or_default();
    result.extend(expanded);
    result
}
