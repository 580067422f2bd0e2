//! Aspect 宏实现

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Error, LitStr, Result};

pub fn impl_aspect_derive(input: &DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "#[derive(Aspect)] does not support generic types",
        ));
    }

    let pointcut_expr = extract_pointcut_attr(input)?;
    let order = extract_order_attr(input)?;

    // 自动注册到 inventory
    let expanded = quote! {
        ::trellis_aop::inventory::submit! {
            ::trellis_aop::AdvisorRegistration::new(
                stringify!(#name),
                #pointcut_expr,
                #order,
                || ::std::sync::Arc::new(#name::new())
                    as ::std::sync::Arc<dyn ::trellis_aop::MethodInterceptor>
            )
        }
    };

    Ok(expanded)
}

/// `#[pointcut("expression")]`，缺省匹配所有方法
fn extract_pointcut_attr(input: &DeriveInput) -> Result<String> {
    for attr in &input.attrs {
        if attr.path().is_ident("pointcut") {
            let expr: LitStr = attr.parse_args()?;
            return Ok(expr.value());
        }
    }
    Ok(String::new())
}

/// `#[order(n)]`，缺省为最低优先级
fn extract_order_attr(input: &DeriveInput) -> Result<TokenStream> {
    for attr in &input.attrs {
        if attr.path().is_ident("order") {
            let order: syn::Expr = attr.parse_args()?;
            if let syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Int(lit),
                ..
            }) = &order
            {
                lit.base10_parse::<i32>()?;
            }
            return Ok(quote!(#order));
        }
    }
    Ok(quote!(::trellis_aop::LOWEST_PRECEDENCE))
}
