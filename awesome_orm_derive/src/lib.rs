extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Expr, GenericArgument, Lit, LitStr, PathArguments, Type};

/// Declares a struct as a database model.
///
/// ```ignore
/// #[model(table = "users")]
/// #[derive(Debug, Default, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[field(primary_key, ddl = "varchar(50)", default = next_id)]
///     pub id: Option<String>,
///     #[field(ddl = "varchar(50)")]
///     pub email: Option<String>,
///     pub admin: Option<bool>,
/// }
/// ```
///
/// Every field must be `Option<T>`. The field kind follows `T`: `String` is a
/// string column (or text with `#[field(text)]`), `bool` boolean, integers
/// integer and `f32`/`f64` float.
#[proc_macro_attribute]
pub fn model(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(item as DeriveInput);

    // -------- table override --------
    let mut table: Option<LitStr> = None;
    if !attr.is_empty() {
        let parser = syn::meta::parser(|meta| {
            if meta.path.is_ident("table") || meta.path.is_ident("table_name") {
                table = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported model option, expected `table = \"...\"`"))
            }
        });
        parse_macro_input!(attr with parser);
    }

    match expand(&mut input, table) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

enum Kind {
    String,
    Text,
    Boolean,
    Integer,
    Float,
}

#[derive(Default)]
struct FieldOptions {
    primary_key: bool,
    text: bool,
    name: Option<LitStr>,
    ddl: Option<LitStr>,
    default: Option<Expr>,
}

fn expand(input: &mut DeriveInput, table: Option<LitStr>) -> syn::Result<TokenStream2> {
    let struct_name = input.ident.clone();
    let model_name = struct_name.to_string();

    let fields = match &mut input.data {
        syn::Data::Struct(s) => &mut s.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "#[model] can only be used on structs with named fields",
            ));
        }
    };

    let mut declared = Vec::new();
    for f in fields.iter_mut() {
        let Some(ident) = f.ident.as_ref() else {
            return Err(syn::Error::new_spanned(&*f, "#[model] fields must be named"));
        };
        let attr_name = ident.to_string();

        let mut options = FieldOptions::default();
        for attr in f.attrs.iter().filter(|a| a.path().is_ident("field")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("primary_key") {
                    options.primary_key = true;
                } else if meta.path.is_ident("text") {
                    options.text = true;
                } else if meta.path.is_ident("name") {
                    options.name = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("ddl") {
                    options.ddl = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("default") {
                    options.default = Some(meta.value()?.parse()?);
                } else {
                    return Err(meta.error("unsupported field option"));
                }
                Ok(())
            })?;
        }
        // The `field` helper is not a real attribute; it must not reach rustc.
        f.attrs.retain(|a| !a.path().is_ident("field"));

        let kind = field_kind(&f.ty, options.text)?;
        declared.push(field_tokens(&attr_name, &f.ty, kind, options)?);
    }

    let table = match table {
        Some(lit) => quote! { ::std::option::Option::Some(#lit) },
        None => quote! { ::std::option::Option::None },
    };

    Ok(quote! {
        #input

        impl ::awesome_orm::Model for #struct_name {
            fn try_descriptor() -> ::std::result::Result<
                &'static ::awesome_orm::ModelDescriptor,
                ::awesome_orm::RegistrationError,
            > {
                static DESCRIPTOR: ::std::sync::OnceLock<
                    ::std::result::Result<::awesome_orm::ModelDescriptor, ::awesome_orm::RegistrationError>,
                > = ::std::sync::OnceLock::new();
                DESCRIPTOR
                    .get_or_init(|| {
                        ::awesome_orm::ModelDescriptor::register(
                            #model_name,
                            #table,
                            ::std::vec![#(#declared),*],
                        )
                    })
                    .as_ref()
                    .map_err(::std::clone::Clone::clone)
            }
        }
    })
}

/// Finds `T` in `Option<T>` and maps it to a field kind.
fn field_kind(ty: &Type, text: bool) -> syn::Result<Kind> {
    let inner = option_inner(ty).ok_or_else(|| {
        syn::Error::new_spanned(ty, "#[model] fields must be declared as Option<T>")
    })?;
    let Type::Path(path) = inner else {
        return Err(syn::Error::new_spanned(inner, "unsupported column type"));
    };
    let ident = path
        .path
        .segments
        .last()
        .map(|s| s.ident.to_string())
        .unwrap_or_default();

    let kind = match ident.as_str() {
        "String" if text => Kind::Text,
        "String" => Kind::String,
        "bool" => Kind::Boolean,
        "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" => Kind::Integer,
        "f32" | "f64" => Kind::Float,
        _ => {
            return Err(syn::Error::new_spanned(
                inner,
                "unsupported column type, expected String, bool, an integer or a float",
            ));
        }
    };
    if text && !matches!(kind, Kind::Text) {
        return Err(syn::Error::new_spanned(ty, "`text` fields must be Option<String>"));
    }
    Ok(kind)
}

fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else { return None };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn field_tokens(attr_name: &str, ty: &Type, kind: Kind, options: FieldOptions) -> syn::Result<TokenStream2> {
    let mut field = match kind {
        Kind::String => quote! { ::awesome_orm::Field::string() },
        Kind::Text => quote! { ::awesome_orm::Field::text() },
        Kind::Boolean => quote! { ::awesome_orm::Field::boolean() },
        Kind::Integer => quote! { ::awesome_orm::Field::integer() },
        Kind::Float => quote! { ::awesome_orm::Field::float() },
    };

    if options.primary_key {
        if matches!(kind, Kind::Boolean | Kind::Text) {
            return Err(syn::Error::new_spanned(
                ty,
                "boolean and text fields cannot be primary keys",
            ));
        }
        field = quote! { #field.primary_key() };
    }
    if let Some(name) = options.name {
        field = quote! { #field.named(#name) };
    }
    if let Some(ddl) = options.ddl {
        field = quote! { #field.ddl(#ddl) };
    }
    match options.default {
        Some(Expr::Lit(expr_lit)) => {
            let lit: &Lit = &expr_lit.lit;
            field = quote! { #field.default_value(::awesome_orm::serde_json::json!(#lit)) };
        }
        Some(Expr::Path(path)) => {
            field = quote! {
                #field.default_with(|| ::awesome_orm::serde_json::Value::from(#path()))
            };
        }
        Some(other) => {
            return Err(syn::Error::new_spanned(
                other,
                "default must be a literal or a path to a zero-argument function",
            ));
        }
        None => {}
    }

    Ok(quote! { (#attr_name, #field) })
}
