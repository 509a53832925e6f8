//! The `#[kiln_testhelpers::test]` attribute.

use unsynn::*;

keyword! {
    KFn = "fn";
}

unsynn! {
    /// Attributes, visibility and qualifiers such as `async`
    struct Prelude {
        items: Any<Cons<Except<KFn>, TokenTree>>,
    }

    /// Parameters, return type and where clause
    struct Signature {
        items: Any<Cons<Except<BraceGroup>, TokenTree>>,
    }

    struct TestFn {
        prelude: Prelude,
        _fn: KFn,
        name: Ident,
        signature: Signature,
        body: BraceGroup,
    }
}

impl quote::ToTokens for Prelude {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        self.items.to_tokens(tokens)
    }
}

impl quote::ToTokens for Signature {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        self.items.to_tokens(tokens)
    }
}

/// Marks a test and installs kiln's test tracing before its body runs.
///
/// ```ignore
/// #[kiln_testhelpers::test]
/// fn plain() {}
///
/// #[kiln_testhelpers::test(tokio::test(start_paused = true))]
/// async fn with_paused_time() {}
/// ```
#[proc_macro_attribute]
pub fn test(
    attr: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let item = TokenStream::from(item);
    let mut tokens = item.to_token_iter();
    let TestFn {
        prelude,
        _fn,
        name,
        signature,
        body,
    } = match tokens.parse::<TestFn>() {
        Ok(test) => test,
        Err(_) => {
            return quote::quote! {
                ::core::compile_error!("#[kiln_testhelpers::test] expects a function");
            }
            .into();
        }
    };

    let test_attr = if attr.is_empty() {
        quote::quote! { #[::core::prelude::rust_2024::test] }
    } else {
        let attr = TokenStream::from(attr);
        quote::quote! { #[#attr] }
    };
    let body = body.0.stream();

    quote::quote! {
        #test_attr
        #prelude fn #name #signature {
            ::kiln_testhelpers::setup();

            #body
        }
    }
    .into()
}
