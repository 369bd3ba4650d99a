use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat};

/// Log slow navigation build phases when the `perf_stats` feature is enabled.
///
/// The pedestrian and vehicle grids are built by the same functions from the
/// same layout, but their sizes differ a lot: the road ring covers several
/// times the area of the sidewalk ring. A bare function name would mix both
/// timings in the log. If the wrapped function takes an `agent: AgentClass`
/// parameter, its value is added to the line, e.g.
/// `[PERF] build_grid (Vehicle): 41.2ms`.
///
/// `#[profile(5)]` sets the threshold in milliseconds (default 1). Without
/// `perf_stats` the function is emitted unchanged.
///
/// ```ignore
/// #[profile(5)]
/// pub fn build_grid(config: &NavigationConfig, plots: &[Plot], crosswalks: &[Crosswalk], agent: AgentClass) -> WalkabilityGrid {
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        attr.to_string().trim().parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    let has_agent_param = sig.inputs.iter().any(|arg| {
        if let FnArg::Typed(pat_type) = arg {
            if let Pat::Ident(pat_ident) = &*pat_type.pat {
                if pat_ident.ident == "agent" {
                    let ty = &pat_type.ty;
                    let type_str = quote!(#ty).to_string();
                    return type_str.contains("AgentClass");
                }
            }
        }
        false
    });

    let profile_guard_def = if has_agent_param {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
                agent: String,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() >= #threshold_ms {
                        bevy::prelude::info!("[PERF] {} ({}): {:?}", self.name, self.agent, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
                agent: format!("{:?}", agent),
            }
        }
    } else {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() >= #threshold_ms {
                        bevy::prelude::info!("[PERF] {}: {:?}", self.name, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
            }
        }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                #profile_guard_def
            };

            #block
        }
    };

    output.into()
}
