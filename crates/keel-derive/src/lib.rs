//! Derive macro for keel entities.
//!
//! This crate provides `#[derive(Entity)]`, which writes out an entity's
//! schema description and its record conversions at compile time.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, GenericArgument, Ident, LitStr, Meta,
    PathArguments, Token, Type,
};

/// Derives `keel_core::Entity` for a struct with named fields.
///
/// # Struct Attributes
///
/// - `#[entity(table = "name")]` - SQL table name (defaults to snake_case
///   of the struct name)
/// - `#[entity(comment = "text")]` - table comment
/// - `#[entity(index(name = "ix", columns("a", "b"), unique))]` - declares
///   an index; repeatable
///
/// # Field Attributes
///
/// Only fields carrying `#[column]` are persisted; the others are filled
/// with `Default::default()` when reading.
///
/// - `#[column(name = "column_name")]` - SQL column name (defaults to the
///   field name)
/// - `#[column(primary_key)]`, `#[column(auto_increment)]`
/// - `#[column(read_only)]` - never written by inserts or updates
/// - `#[column(default = "expr")]` - raw SQL default expression
/// - `#[column(comment = "text")]`
/// - `#[column(references = "table.column")]` - foreign key, cascading
/// - `#[column(json)]` - store the field JSON encoded
///
/// # Generated Items
///
/// For a struct `User`, besides the `Entity` impl, this macro generates
/// `UserColumns` with one typed column handle per non-JSON column.
#[proc_macro_derive(Entity, attributes(entity, column))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_entity_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_entity_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let vis = &input.vis;
    let entity_attrs = parse_entity_attrs(&input.attrs, struct_name)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity derive only supports structs",
            ));
        }
    };

    let mut columns: Vec<ColumnInfo> = Vec::new();
    let mut skipped: Vec<Ident> = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.clone() else {
            continue;
        };
        match parse_column_attrs(&field.attrs)? {
            Some(attrs) => columns.push(ColumnInfo {
                column_name: attrs.name.unwrap_or_else(|| field_name.to_string()),
                field_name,
                field_type: field.ty.clone(),
                primary_key: attrs.primary_key,
                auto_increment: attrs.auto_increment,
                read_only: attrs.read_only,
                default_expr: attrs.default_expr,
                comment: attrs.comment,
                references: attrs.references,
                json: attrs.json,
            }),
            None => skipped.push(field_name),
        }
    }

    let Some(primary_key) = columns.iter().find(|c| c.primary_key) else {
        return Err(syn::Error::new_spanned(
            &input,
            "Entity derive requires one #[column(primary_key)] field",
        ));
    };
    let id_type = &primary_key.field_type;

    let table_name = &entity_attrs.table;
    let table_comment = &entity_attrs.comment;
    let field_entries: Vec<TokenStream2> = columns.iter().map(field_entry).collect();
    let index_entries: Vec<TokenStream2> = entity_attrs
        .indexes
        .iter()
        .map(|index| {
            let name = &index.name;
            let cols = &index.columns;
            let unique = index.unique.then(|| quote! { .unique() });
            quote! {
                .index(::keel_core::TableIndex::new(#name, [#(#cols),*]) #unique)
            }
        })
        .collect();

    let record_inserts: Vec<TokenStream2> = columns
        .iter()
        .map(|c| {
            let column = &c.column_name;
            let field = &c.field_name;
            if c.json {
                quote! { record.insert(#column, ::keel_core::Value::json(&self.#field)?); }
            } else {
                quote! { record.insert(#column, ::keel_core::ToValue::to_value(&self.#field)); }
            }
        })
        .collect();

    let record_reads: Vec<TokenStream2> = columns
        .iter()
        .map(|c| {
            let column = &c.column_name;
            let field = &c.field_name;
            if c.json {
                quote! { #field: record.json(#column)?, }
            } else {
                quote! { #field: record.get(#column)?, }
            }
        })
        .collect();

    let columns_struct = format_ident!("{}Columns", struct_name);
    let column_accessors: Vec<TokenStream2> = columns
        .iter()
        .filter(|c| !c.json)
        .map(|c| {
            let method = &c.field_name;
            let column = &c.column_name;
            let ty = &c.field_type;
            quote! {
                /// Typed handle for this column.
                #[must_use]
                pub fn #method() -> ::keel_core::Column<#struct_name, #ty> {
                    ::keel_core::Column::new(#column)
                }
            }
        })
        .collect();

    let expanded = quote! {
        impl ::keel_core::Entity for #struct_name {
            type Id = #id_type;

            fn schema() -> ::keel_core::EntitySchema {
                ::keel_core::EntitySchema::new(#table_name)
                    .comment(#table_comment)
                    #(#field_entries)*
                    #(#index_entries)*
            }

            fn to_record(&self) -> ::keel_core::Result<::keel_core::Record> {
                let mut record = ::keel_core::Record::new();
                #(#record_inserts)*
                Ok(record)
            }

            fn from_record(record: &::keel_core::Record) -> ::keel_core::Result<Self> {
                Ok(Self {
                    #(#record_reads)*
                    #(#skipped: ::core::default::Default::default(),)*
                })
            }
        }

        /// Typed column handles.
        #[derive(Debug, Clone, Copy)]
        #vis struct #columns_struct;

        impl #columns_struct {
            #(#column_accessors)*
        }
    };

    Ok(expanded)
}

fn field_entry(info: &ColumnInfo) -> TokenStream2 {
    let column = &info.column_name;
    let ty = &info.field_type;

    let base = if info.json {
        let optional = is_option(ty).then(|| quote! { .optional() });
        quote! { ::keel_core::Field::new(#column, ::keel_core::FieldType::Json) #optional }
    } else {
        quote! { ::keel_core::Field::of::<#ty>(#column) }
    };

    let primary_key = info.primary_key.then(|| quote! { .primary_key() });
    let auto_increment = info.auto_increment.then(|| quote! { .auto_increment() });
    let read_only = info.read_only.then(|| quote! { .read_only() });
    let default = info
        .default_expr
        .as_ref()
        .map(|expr| quote! { .default_value(#expr) });
    let comment = info.comment.as_ref().map(|c| quote! { .comment(#c) });
    let references = info
        .references
        .as_ref()
        .map(|(table, col)| quote! { .references(#table, #col) });

    quote! {
        .field(#base #primary_key #auto_increment #read_only #default #comment #references)
    }
}

fn is_option(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    path.path.segments.last().is_some_and(|segment| {
        segment.ident == "Option"
            && matches!(
                &segment.arguments,
                PathArguments::AngleBracketed(args)
                    if matches!(args.args.first(), Some(GenericArgument::Type(_)))
            )
    })
}

struct ColumnInfo {
    field_name: Ident,
    field_type: Type,
    column_name: String,
    primary_key: bool,
    auto_increment: bool,
    read_only: bool,
    default_expr: Option<String>,
    comment: Option<String>,
    references: Option<(String, String)>,
    json: bool,
}

#[derive(Default)]
struct ColumnAttrs {
    name: Option<String>,
    primary_key: bool,
    auto_increment: bool,
    read_only: bool,
    default_expr: Option<String>,
    comment: Option<String>,
    references: Option<(String, String)>,
    json: bool,
}

struct IndexAttrs {
    name: String,
    columns: Vec<String>,
    unique: bool,
}

struct EntityAttrs {
    table: String,
    comment: String,
    indexes: Vec<IndexAttrs>,
}

fn parse_entity_attrs(attrs: &[Attribute], struct_name: &Ident) -> syn::Result<EntityAttrs> {
    let mut result = EntityAttrs {
        table: to_snake_case(&struct_name.to_string()),
        comment: String::new(),
        indexes: Vec::new(),
    };

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                result.table = meta.value()?.parse::<LitStr>()?.value();
            } else if meta.path.is_ident("comment") {
                result.comment = meta.value()?.parse::<LitStr>()?.value();
            } else if meta.path.is_ident("index") {
                let mut index = IndexAttrs {
                    name: String::new(),
                    columns: Vec::new(),
                    unique: false,
                };
                meta.parse_nested_meta(|inner| {
                    if inner.path.is_ident("name") {
                        index.name = inner.value()?.parse::<LitStr>()?.value();
                    } else if inner.path.is_ident("unique") {
                        index.unique = true;
                    } else if inner.path.is_ident("columns") {
                        let content;
                        syn::parenthesized!(content in inner.input);
                        let names = content.parse_terminated(
                            |input| input.parse::<LitStr>(),
                            Token![,],
                        )?;
                        index.columns = names.iter().map(LitStr::value).collect();
                    } else {
                        return Err(inner.error("unknown index attribute"));
                    }
                    Ok(())
                })?;
                if index.name.is_empty() || index.columns.is_empty() {
                    return Err(meta.error("index needs a name and at least one column"));
                }
                result.indexes.push(index);
            } else {
                return Err(meta.error("unknown entity attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

fn parse_column_attrs(attrs: &[Attribute]) -> syn::Result<Option<ColumnAttrs>> {
    let mut found = None;

    for attr in attrs {
        if !attr.path().is_ident("column") {
            continue;
        }
        let result = found.get_or_insert_with(ColumnAttrs::default);

        // Handle empty attribute like #[column]
        if matches!(attr.meta, Meta::Path(_)) {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                result.primary_key = true;
            } else if meta.path.is_ident("auto_increment") {
                result.auto_increment = true;
            } else if meta.path.is_ident("read_only") {
                result.read_only = true;
            } else if meta.path.is_ident("json") {
                result.json = true;
            } else if meta.path.is_ident("name") {
                result.name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("default") {
                result.default_expr = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("comment") {
                result.comment = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("references") {
                let lit = meta.value()?.parse::<LitStr>()?;
                let value = lit.value();
                let Some((table, column)) = value.split_once('.') else {
                    return Err(syn::Error::new_spanned(
                        lit,
                        "references must look like \"table.column\"",
                    ));
                };
                result.references = Some((table.to_string(), column.to_string()));
            } else {
                return Err(meta.error("unknown column attribute"));
            }
            Ok(())
        })?;
    }

    Ok(found)
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
