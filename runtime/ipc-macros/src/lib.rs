//! KaaL IPC interface macro - build-time message sizing
//!
//! # Purpose
//! Turns a declarative RPC interface into the constant tables the
//! `kaal_ipc::interface` size calculus works on, so every stub and server
//! entrypoint gets message buffers sized exactly for the interface.
//!
//! # Integration Points
//! - Depends on: `kaal_ipc::interface` (generated code refers to it)
//! - Provides to: RPC stubs and server entrypoints
//! - Generates: function table, interface layout, opcodes, exception codes,
//!   call/reply buffer types
//!
//! # Syntax
//! ```ignore
//! rpc_interface! {
//!     /// File system session
//!     pub interface FileSystem {
//!         fn open(path: in [u8; 64], mode: u32) -> Capability throws(NotFound, Denied);
//!         fn read(handle: u64, data: out [u8; 256]) -> usize;
//!         fn seek(handle: u64, offset: inout u64);
//!     }
//! }
//! ```
//! Arguments are inputs unless tagged `out` or `inout`. Arguments and return
//! values of type `Capability` travel as capabilities, everything else as
//! word-aligned data.
//!
//! # Testing Strategy
//! - Unit tests: parser and expansion (`syn::parse2`)
//! - Integration tests: `kaal-ipc/tests/interface.rs` evaluates the generated
//!   constants

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{braced, parenthesized, parse_macro_input, Attribute, Ident, Token, Type, Visibility};

/// Argument direction as written in the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
    InOut,
}

struct ArgDef {
    name: Ident,
    direction: Direction,
    ty: Type,
}

struct FunctionDef {
    attrs: Vec<Attribute>,
    name: Ident,
    args: Vec<ArgDef>,
    ret: Option<Type>,
    exceptions: Vec<Ident>,
}

struct InterfaceDef {
    attrs: Vec<Attribute>,
    vis: Visibility,
    name: Ident,
    functions: Vec<FunctionDef>,
}

impl Parse for ArgDef {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name: Ident = input.parse()?;
        input.parse::<Token![:]>()?;

        let direction = if input.peek(Token![in]) {
            input.parse::<Token![in]>()?;
            Direction::In
        } else if let Some(direction) = peek_direction(input) {
            input.parse::<Ident>()?;
            direction
        } else {
            Direction::In
        };

        let ty: Type = input.parse()?;
        Ok(ArgDef { name, direction, ty })
    }
}

/// `out` / `inout` followed by a type
fn peek_direction(input: ParseStream) -> Option<Direction> {
    let fork = input.fork();
    let ident: Ident = fork.parse().ok()?;
    if fork.is_empty() || fork.peek(Token![,]) {
        return None;
    }
    if ident == "out" {
        Some(Direction::Out)
    } else if ident == "inout" {
        Some(Direction::InOut)
    } else {
        None
    }
}

impl Parse for FunctionDef {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        input.parse::<Token![fn]>()?;
        let name: Ident = input.parse()?;

        let content;
        parenthesized!(content in input);
        let args: Punctuated<ArgDef, Token![,]> = content.parse_terminated(ArgDef::parse, Token![,])?;

        let ret = if input.peek(Token![->]) {
            input.parse::<Token![->]>()?;
            Some(input.parse::<Type>()?)
        } else {
            None
        };

        let mut exceptions = Vec::new();
        if input.peek(Ident) {
            let keyword: Ident = input.parse()?;
            if keyword != "throws" {
                return Err(syn::Error::new(keyword.span(), "expected `throws(...)` or `;`"));
            }
            let list;
            parenthesized!(list in input);
            let names: Punctuated<Ident, Token![,]> = list.parse_terminated(Ident::parse, Token![,])?;
            exceptions.extend(names);
        }

        input.parse::<Token![;]>()?;

        Ok(FunctionDef {
            attrs,
            name,
            args: args.into_iter().collect(),
            ret,
            exceptions,
        })
    }
}

impl Parse for InterfaceDef {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        let vis: Visibility = input.parse()?;

        let keyword: Ident = input.parse()?;
        if keyword != "interface" {
            return Err(syn::Error::new(keyword.span(), "expected `interface`"));
        }
        let name: Ident = input.parse()?;

        let body;
        braced!(body in input);
        let mut functions: Vec<FunctionDef> = Vec::new();
        while !body.is_empty() {
            let function: FunctionDef = body.parse()?;
            if functions.iter().any(|f| f.name == function.name) {
                return Err(syn::Error::new(
                    function.name.span(),
                    format!("duplicate RPC function `{}`", function.name),
                ));
            }
            functions.push(function);
        }

        Ok(InterfaceDef {
            attrs,
            vis,
            name,
            functions,
        })
    }
}

fn is_capability(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Capability"),
        _ => false,
    }
}

fn kind_tokens(ty: Option<&Type>) -> TokenStream2 {
    match ty {
        None => quote! { ::kaal_ipc::interface::ArgKind::NONE },
        Some(ty) if is_capability(ty) => quote! { ::kaal_ipc::interface::ArgKind::Capability },
        Some(ty) => quote! { ::kaal_ipc::interface::ArgKind::data::<#ty>() },
    }
}

/// `NotFound` -> `NOT_FOUND`
fn upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        out.extend(ch.to_uppercase());
    }
    out
}

fn expand(def: InterfaceDef) -> TokenStream2 {
    let InterfaceDef {
        attrs,
        vis,
        name,
        functions,
    } = def;

    let mut tables = Vec::new();
    let mut consts = Vec::new();

    for (opcode, function) in functions.iter().enumerate() {
        let fn_name = function.name.to_string();
        let fn_upper = upper_snake(&fn_name);

        let args = function.args.iter().map(|arg| {
            let arg_name = arg.name.to_string();
            let direction = match arg.direction {
                Direction::In => quote! { ::kaal_ipc::interface::Direction::In },
                Direction::Out => quote! { ::kaal_ipc::interface::Direction::Out },
                Direction::InOut => quote! { ::kaal_ipc::interface::Direction::InOut },
            };
            let kind = kind_tokens(Some(&arg.ty));
            quote! {
                ::kaal_ipc::interface::RpcArg {
                    name: #arg_name,
                    direction: #direction,
                    kind: #kind,
                }
            }
        });
        let ret = kind_tokens(function.ret.as_ref());
        let exceptions = function.exceptions.iter().map(Ident::to_string);

        tables.push(quote! {
            ::kaal_ipc::interface::RpcFunction {
                name: #fn_name,
                args: &[#(#args),*],
                ret: #ret,
                exceptions: &[#(#exceptions),*],
            }
        });

        let op_const = format_ident!("OP_{}", fn_upper);
        let fn_attrs = &function.attrs;
        let opcode = opcode as u64;
        consts.push(quote! {
            #(#fn_attrs)*
            pub const #op_const: ::kaal_ipc::Word = #opcode;
        });

        for (index, exception) in function.exceptions.iter().enumerate() {
            let exc_const = Ident::new(
                &format!("{}_{}", fn_upper, upper_snake(&exception.to_string())),
                exception.span(),
            );
            consts.push(quote! {
                pub const #exc_const: ::kaal_ipc::Word =
                    ::kaal_ipc::interface::RpcExceptionCode::exception(#index).to_word();
            });
        }
    }

    let call_buf = format_ident!("{}CallBuf", name);
    let reply_buf = format_ident!("{}ReplyBuf", name);
    let count = functions.len();

    quote! {
        #(#attrs)*
        #[derive(Debug, Clone, Copy, Default)]
        #vis struct #name;

        impl #name {
            /// RPC functions in opcode order
            pub const FUNCTIONS: &'static [::kaal_ipc::interface::RpcFunction] = &[#(#tables),*];

            pub const FUNCTION_COUNT: usize = #count;

            pub const LAYOUT: ::kaal_ipc::interface::InterfaceLayout =
                ::kaal_ipc::interface::InterfaceLayout::of(Self::FUNCTIONS);

            pub const CALL_WORDS: usize = Self::LAYOUT.call_words;

            pub const REPLY_WORDS: usize = Self::LAYOUT.reply_words;

            #(#consts)*
        }

        #vis type #call_buf = ::kaal_ipc::MsgBuf<{ #name::CALL_WORDS }>;

        #vis type #reply_buf = ::kaal_ipc::MsgBuf<{ #name::REPLY_WORDS }>;
    }
}

/// Declare an RPC interface and derive its message sizes
///
/// See the crate documentation for the syntax.
#[proc_macro]
pub fn rpc_interface(input: TokenStream) -> TokenStream {
    let def = parse_macro_input!(input as InterfaceDef);
    if def.functions.is_empty() {
        let msg = format!("interface `{}` declares no RPC functions", def.name);
        return TokenStream::from(syn::Error::new(Span::call_site(), msg).to_compile_error());
    }
    TokenStream::from(expand(def))
}
