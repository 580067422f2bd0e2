//! #[aop_interface] 属性宏实现

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{
    Error, FnArg, GenericArgument, Ident, ItemTrait, Pat, PathArguments, Result, ReturnType,
    Signature, TraitItem, TraitItemFn, Type,
};

struct InterfaceMethod<'a> {
    sig: &'a Signature,
    konst: Ident,
    params: Vec<(&'a Ident, &'a Type)>,
    /// `Result<T>` 中的 `T`
    value: &'a Type,
}

pub fn impl_aop_interface(attr: TokenStream, item: ItemTrait) -> Result<TokenStream> {
    if !attr.is_empty() {
        return Err(Error::new_spanned(attr, "#[aop_interface] takes no arguments"));
    }
    if !item.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &item.generics,
            "#[aop_interface] does not support generic traits",
        ));
    }

    let mut methods = Vec::new();
    for trait_item in &item.items {
        match trait_item {
            TraitItem::Fn(f) => methods.push(parse_method(f)?),
            other => {
                return Err(Error::new_spanned(
                    other,
                    "#[aop_interface] traits may only contain methods",
                ))
            }
        }
    }

    let trait_ident = &item.ident;
    let vis = &item.vis;
    let facade = format_ident!("{}Proxy", trait_ident);
    let interface_name = trait_ident.to_string();

    let consts = methods.iter().map(|m| {
        let konst = &m.konst;
        let name = m.sig.ident.to_string();
        let params = m.params.iter().map(|(_, ty)| type_name(ty));
        let returns = type_name(m.value);
        quote! {
            pub const #konst: ::trellis_aop::Method =
                ::trellis_aop::Method::new(#interface_name, #name, &[#(#params),*], #returns);
        }
    });
    let konsts: Vec<&Ident> = methods.iter().map(|m| &m.konst).collect();

    let bindings = methods.iter().map(|m| {
        let konst = &m.konst;
        let ident = &m.sig.ident;
        let names: Vec<&Ident> = m.params.iter().map(|(name, _)| *name).collect();
        let loads = m.params.iter().enumerate().map(|(index, (name, ty))| {
            quote! { let #name: #ty = args.cloned::<#ty>(#index)?; }
        });
        quote! {
            .method(
                #facade::#konst,
                |target: &C, args: &mut ::trellis_aop::Arguments|
                    -> ::trellis_aop::__private::anyhow::Result<::trellis_aop::Value> {
                    #(#loads)*
                    let value = <C as #trait_ident>::#ident(target #(, #names)*)?;
                    Ok(::std::boxed::Box::new(value) as ::trellis_aop::Value)
                },
            )
        }
    });

    let forwards = methods.iter().map(|m| {
        let sig = m.sig;
        let konst = &m.konst;
        let value = m.value;
        let names = m.params.iter().map(|(name, _)| *name);
        quote! {
            #sig {
                self.proxy.call::<#value>(
                    &Self::#konst,
                    ::trellis_aop::Arguments::new() #(.with(#names))*,
                )
            }
        }
    });

    let facade_doc = format!("`{}` 的代理门面，所有调用都经过拦截链", interface_name);

    Ok(quote! {
        #item

        #[doc = #facade_doc]
        #[derive(Clone, Debug)]
        #vis struct #facade {
            proxy: ::trellis_aop::Proxy,
        }

        impl #facade {
            #(#consts)*

            #[doc(hidden)]
            pub const __METHODS: &'static [::trellis_aop::Method] = &[#(Self::#konsts),*];

            pub fn into_proxy(self) -> ::trellis_aop::Proxy {
                self.proxy
            }
        }

        impl ::trellis_aop::ProxyFacade for #facade {
            fn interface() -> &'static ::std::sync::Arc<::trellis_aop::Interface> {
                static INTERFACE: ::trellis_aop::__private::Lazy<::std::sync::Arc<::trellis_aop::Interface>> =
                    ::trellis_aop::__private::Lazy::new(|| {
                        ::std::sync::Arc::new(::trellis_aop::Interface::new(
                            #interface_name,
                            #facade::__METHODS.to_vec(),
                        ))
                    });
                &INTERFACE
            }

            fn from_proxy_unchecked(proxy: ::trellis_aop::Proxy) -> Self {
                Self { proxy }
            }

            fn proxy(&self) -> &::trellis_aop::Proxy {
                &self.proxy
            }
        }

        impl<C> ::trellis_aop::BindInterface<C> for #facade
        where
            C: #trait_ident + ::std::any::Any + ::std::marker::Send + ::std::marker::Sync,
        {
            fn bind(builder: ::trellis_aop::ClassBuilder<C>) -> ::trellis_aop::ClassBuilder<C> {
                builder
                    .interface(::std::sync::Arc::clone(
                        <#facade as ::trellis_aop::ProxyFacade>::interface(),
                    ))
                    #(#bindings)*
            }
        }

        impl #trait_ident for #facade {
            #(#forwards)*
        }
    })
}

fn parse_method(f: &TraitItemFn) -> Result<InterfaceMethod<'_>> {
    let sig = &f.sig;
    if sig.asyncness.is_some() {
        return Err(Error::new_spanned(sig, "#[aop_interface] methods must be synchronous"));
    }
    if !sig.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &sig.generics,
            "#[aop_interface] methods cannot be generic",
        ));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none() => {}
        _ => {
            return Err(Error::new_spanned(
                sig,
                "#[aop_interface] methods must take `&self`",
            ))
        }
    }

    let mut params = Vec::new();
    for input in inputs {
        let FnArg::Typed(pat_type) = input else {
            return Err(Error::new_spanned(input, "unexpected receiver"));
        };
        let Pat::Ident(pat_ident) = &*pat_type.pat else {
            return Err(Error::new_spanned(
                &pat_type.pat,
                "#[aop_interface] parameters must be plain identifiers",
            ));
        };
        if matches!(&*pat_type.ty, Type::Reference(_)) {
            return Err(Error::new_spanned(
                &pat_type.ty,
                "#[aop_interface] parameters must be owned (Clone + Send + 'static)",
            ));
        }
        params.push((&pat_ident.ident, &*pat_type.ty));
    }

    let value = result_value_type(&sig.output).ok_or_else(|| {
        Error::new_spanned(&sig.output, "#[aop_interface] methods must return anyhow::Result<T>")
    })?;

    let konst = format_ident!("{}", sig.ident.to_string().to_uppercase());
    if konst == "__METHODS" {
        return Err(Error::new_spanned(
            &sig.ident,
            "#[aop_interface] reserves the method name `__methods`",
        ));
    }

    Ok(InterfaceMethod {
        sig,
        konst,
        params,
        value,
    })
}

fn result_value_type(output: &ReturnType) -> Option<&Type> {
    let ReturnType::Type(_, ty) = output else {
        return None;
    };
    let Type::Path(type_path) = &**ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    }
}

fn type_name(ty: &Type) -> String {
    quote!(#ty).to_string().replace(' ', "")
}
