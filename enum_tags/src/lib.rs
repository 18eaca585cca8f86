use proc_macro::TokenStream;
use quote::quote;

mod kw {
    syn::custom_keyword!(public);
    syn::custom_keyword!(private);
    syn::custom_keyword!(repr);
}

/// `public, repr(T)` or `private, repr(T)`.
struct Arguments {
    visibility: syn::Visibility,
    repr_type: syn::Type,
}

impl syn::parse::Parse for Arguments {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let lookahead = input.lookahead1();
        let (visibility, keyword) = if lookahead.peek(kw::public) {
            let span = input.parse::<kw::public>()?.span;
            (syn::Visibility::Public(syn::token::Pub { span }), "public")
        } else if lookahead.peek(kw::private) {
            input.parse::<kw::private>()?;
            (syn::Visibility::Inherited, "private")
        } else {
            return Err(lookahead.error());
        };

        let context = |what: &str| {
            let message = format!("expected {} after `{}`", what, keyword);
            move |mut error: syn::Error| {
                error.combine(syn::Error::new(input.span(), message));
                error
            }
        };
        input.parse::<syn::Token![,]>().map_err(context("`,`"))?;
        input.parse::<kw::repr>().map_err(context("`repr(...)`"))?;

        let content;
        syn::parenthesized!(content in input);
        Ok(Self {
            visibility,
            repr_type: content.parse()?,
        })
    }
}

/// One variant after discriminant resolution.
struct TaggedVariant {
    ident: syn::Ident,
    tag_ident: syn::Ident,
    /// Upper-case spelling of the variant name, also the prefix of
    /// `tag_ident`.
    name: String,
    discriminant: usize,
    fields: syn::Fields,
}

fn resolve_variants(
    variants: impl Iterator<Item = syn::Variant>,
) -> syn::Result<Vec<TaggedVariant>> {
    let mut resolved = vec![];
    let mut discriminant = 0;

    for variant in variants {
        if let Some((_, custom_discriminant)) = variant.discriminant {
            match custom_discriminant {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Int(int_literal),
                    ..
                }) => discriminant = int_literal.base10_parse::<usize>()?,
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "Only literal discriminants are allowed",
                    ));
                }
            }
        }

        let name = variant.ident.to_string().to_ascii_uppercase();
        resolved.push(TaggedVariant {
            tag_ident: quote::format_ident!("{}_TAG", name),
            ident: variant.ident,
            name,
            discriminant,
            fields: variant.fields,
        });

        discriminant += 1;
    }

    Ok(resolved)
}

fn impl_enum_tags(
    enum_visibility: syn::Visibility,
    enum_name: syn::Ident,
    repr_type: syn::Type,
    variants: Vec<TaggedVariant>,
) -> proc_macro2::TokenStream {
    let mut tag_consts = vec![];
    let mut tag_cases = vec![];

    for variant in &variants {
        let TaggedVariant {
            ident,
            tag_ident,
            discriminant,
            ..
        } = variant;

        tag_consts.push(quote! {
            #[doc = concat!("`#[enum_tags]`-generated tag for the variant `Self::", stringify!(#ident), "`.")]
            #enum_visibility const #tag_ident: #repr_type = #discriminant as _;
        });

        tag_cases.push(match variant.fields {
            syn::Fields::Named(_) => quote! { Self::#ident { .. } => #discriminant as _ },
            syn::Fields::Unnamed(_) => quote! { Self::#ident(..) => #discriminant as _ },
            syn::Fields::Unit => quote! { Self::#ident => #discriminant as _ },
        });
    }

    let fieldless = variants
        .iter()
        .all(|variant| matches!(variant.fields, syn::Fields::Unit));
    let lookup_impl = if fieldless {
        impl_fieldless_lookup(&enum_visibility, &repr_type, &variants)
    } else {
        quote! {}
    };

    quote! {
        impl #enum_name {
            #(#tag_consts)*

            #[doc = "`#[enum_tags]`-generated getter for this variant's tag."]
            #enum_visibility const fn tag(&self) -> #repr_type {
                match self {
                    #(#tag_cases),*
                }
            }

            #lookup_impl
        }
    }
}

/// Reverse lookups only make sense when a tag alone determines the value.
fn impl_fieldless_lookup(
    enum_visibility: &syn::Visibility,
    repr_type: &syn::Type,
    variants: &[TaggedVariant],
) -> proc_macro2::TokenStream {
    let count = variants.len();
    let idents = variants.iter().map(|variant| &variant.ident);
    let all_idents = idents.clone();
    let name_idents = idents.clone();
    let lookup_idents = idents.clone();
    let tag_idents = variants.iter().map(|variant| &variant.tag_ident);
    let names = variants.iter().map(|variant| &variant.name);
    let lookup_names = names.clone();

    quote! {
        #[doc = "`#[enum_tags]`-generated list of every variant in tag order."]
        #enum_visibility const ALL: [Self; #count] = [#(Self::#all_idents),*];

        #[doc = "`#[enum_tags]`-generated inverse of [`Self::tag`]."]
        #enum_visibility const fn from_tag(tag: #repr_type) -> Option<Self> {
            match tag {
                #(Self::#tag_idents => Some(Self::#idents),)*
                _ => None,
            }
        }

        #[doc = "`#[enum_tags]`-generated upper-case name of this variant."]
        #enum_visibility const fn tag_name(&self) -> &'static str {
            match self {
                #(Self::#name_idents => #names),*
            }
        }

        #[doc = "`#[enum_tags]`-generated inverse of [`Self::tag_name`], ignoring ASCII case."]
        #enum_visibility fn from_tag_name(name: &str) -> Option<Self> {
            #(
                if name.eq_ignore_ascii_case(#lookup_names) {
                    return Some(Self::#lookup_idents);
                }
            )*
            None
        }
    }
}

/// Adds an `impl` block to an `enum` with a `<VARIANT>_TAG` constant holding
/// the discriminant of each variant and a `tag()` getter.
///
/// The argument gives the visibility of the generated items and the type of
/// the tags, for instance `#[enum_tags(public, repr(u8))]` or
/// `#[enum_tags(private, repr(u32))]`. The tag type only has to be a number
/// a `usize` casts to with `as`; it is unrelated to any `#[repr(...)]` on the
/// enum itself. Discriminants, when given, must be integer literals.
///
/// When every variant is a unit variant, the `impl` also carries `ALL`,
/// `from_tag`, `tag_name` and `from_tag_name`, where the name of a variant is
/// its identifier in upper case (`Self::Jnz` is `"JNZ"`).
#[proc_macro_attribute]
pub fn enum_tags(args: TokenStream, input: TokenStream) -> TokenStream {
    expand(args.into(), input.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(
    args: proc_macro2::TokenStream,
    input: proc_macro2::TokenStream,
) -> syn::Result<proc_macro2::TokenStream> {
    let Arguments {
        visibility,
        repr_type,
    } = syn::parse2(args)?;
    let item: syn::DeriveInput = syn::parse2(input)?;

    let syn::Data::Enum(data_enum) = &item.data else {
        return Err(syn::Error::new_spanned(
            &item.ident,
            "`#[enum_tags]` only applies to an `enum`",
        ));
    };

    let variants = resolve_variants(data_enum.variants.iter().cloned())?;
    let tags_impl =
        impl_enum_tags(visibility, item.ident.clone(), repr_type, variants);

    Ok(quote! {
        #item

        #tags_impl
    })
}
