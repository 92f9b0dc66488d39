use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one running against a
/// fresh in-memory engine, and inject dependencies.
///
/// Injectable dependencies, matched by type name, are
/// [`rocket::local::asynchronous::Client`], `crate::Engine`,
/// `crate::clock::ManualClock` (driving the engine's time) and
/// `crate::api::auth::AuthCookie`. An `AuthCookie` needs the role to sign in
/// as: `#[backend_test(admin)]` or `#[backend_test(student)]`.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let role = parse_macro_input!(args as Option<Ident>);

    // Extract type information and reject invalid function signatures.
    let (test_args, wants_cookie) = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Pick the identity to sign in as, if any.
    let identity = match role {
        Some(role) if role == "admin" => {
            Some(quote! { crate::model::Identity::admin_example() })
        }
        Some(role) if role == "student" => {
            Some(quote! { crate::model::Identity::student_example() })
        }
        Some(role) => {
            return syn::Error::new(role.span(), "Expected `admin` or `student`")
                .into_compile_error()
                .into();
        }
        None => None,
    };
    let make_cookie = match identity {
        Some(identity) => quote! {
            let config = rocket_client
                .rocket()
                .state::<crate::config::Config>()
                .unwrap();
            let auth_cookie = crate::api::auth::AuthToken::new(&#identity)
                .into_cookie(config)
                .unwrap();
        },
        None if wants_cookie => {
            return syn::Error::new(
                item_fn.sig.span(),
                "An `AuthCookie` needs a role: `#[backend_test(admin)]` or `#[backend_test(student)]`",
            )
            .into_compile_error()
            .into();
        }
        None => quote! {
            let auth_cookie = ();
        },
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            log4rs_test_utils::test_logging::init_logging_once_for(
                ["election_backend"],
                None,
                None,
            );

            /// The test itself.
            #item_fn

            // The engine's background tasks are spawned onto this runtime, so
            // it must outlive the whole test.
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let manual_clock = crate::clock::ManualClock::default();
                let engine = crate::Engine::new(
                    std::sync::Arc::new(crate::store::MemoryStore::new()),
                    std::sync::Arc::new(crate::notify::LogDispatcher),
                    std::sync::Arc::new(manual_clock.clone()),
                );
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_engine(engine.clone()),
                )
                .await
                .unwrap();

                #make_cookie
                let _ = &auth_cookie;

                #new_name(#(#test_args),*).await
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, work out what to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<(Vec<TokenStream2>, bool), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen = vec![];
    let mut args = vec![];
    let mut wants_cookie = false;

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(type_ident) = type_path.path.segments.last().map(|s| &s.ident) {
                    let injected = if type_ident == "Client" {
                        Some(quote! { rocket_client })
                    } else if type_ident == "Engine" {
                        Some(quote! { engine.clone() })
                    } else if type_ident == "ManualClock" {
                        Some(quote! { manual_clock.clone() })
                    } else if type_ident == "AuthCookie" {
                        wants_cookie = true;
                        Some(quote! { auth_cookie.clone() })
                    } else {
                        None
                    };
                    if let Some(injected) = injected {
                        if seen.contains(type_ident) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{type_ident}`"),
                            ));
                        }
                        seen.push(type_ident.clone());
                        args.push(injected);
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client: Client`, `engine: Engine`, `clock: ManualClock` or `auth: AuthCookie`",
        ));
    }

    Ok((args, wants_cookie))
}
