//! Human-readable type rendering.
//!
//! Used by diagnostic addenda and tests. Fully qualified class names are
//! shortened to their last component (`builtins.int` renders as `int`).

use crate::intern::TypeInterner;
use crate::types::*;

/// Render a type the way it would appear in an annotation.
pub fn format_type(interner: &TypeInterner, ty: TypeId) -> String {
    match interner.lookup(ty) {
        None => "<invalid>".to_string(),
        Some(TypeKey::Any) => "Any".to_string(),
        Some(TypeKey::Unknown) => "Unknown".to_string(),
        Some(TypeKey::Never) => "Never".to_string(),
        Some(TypeKey::None(none)) => {
            if none.is_instantiable {
                "type[None]".to_string()
            } else {
                "None".to_string()
            }
        }
        Some(TypeKey::Module(module)) => {
            format!("Module(\"{}\")", interner.resolve_atom(module.name))
        }
        Some(TypeKey::Class(class)) => format_class(interner, &class),
        Some(TypeKey::Function(func)) => format_function(interner, &func),
        Some(TypeKey::Overloaded(overloads)) => {
            let parts: Vec<String> = overloads
                .iter()
                .map(|&o| format_type(interner, o))
                .collect();
            format!("Overload[{}]", parts.join(", "))
        }
        Some(TypeKey::TypeVar(tv)) => {
            let name = interner.resolve_atom(tv.name).to_string();
            if tv.is_instantiable {
                format!("type[{name}]")
            } else {
                name
            }
        }
        Some(TypeKey::Union(members)) => {
            let parts: Vec<String> = members.iter().map(|&m| format_type(interner, m)).collect();
            parts.join(" | ")
        }
        Some(TypeKey::Alias(alias)) => interner.resolve_atom(alias.name).to_string(),
    }
}

fn short_name(interner: &TypeInterner, name: pyz_common::interner::Atom) -> String {
    let full = interner.resolve_atom(name);
    full.rsplit('.').next().unwrap_or(&full).to_string()
}

fn format_class(interner: &TypeInterner, class: &ClassType) -> String {
    let base = short_name(interner, class.name);
    if let Some(literal) = &class.literal {
        let rendered = match literal {
            LiteralValue::Bool(true) => "True".to_string(),
            LiteralValue::Bool(false) => "False".to_string(),
            LiteralValue::Int(value) => value.to_string(),
            LiteralValue::Str(atom) => format!("'{}'", interner.resolve_atom(*atom)),
            LiteralValue::Bytes(atom) => format!("b'{}'", interner.resolve_atom(*atom)),
            LiteralValue::EnumMember(member) => {
                format!("{base}.{}", interner.resolve_atom(*member))
            }
        };
        return format!("Literal[{rendered}]");
    }
    let mut rendered = base;
    if let Some(tuple_args) = &class.tuple_args {
        let parts: Vec<String> = match tuple_args.as_slice() {
            [only] if only.is_unbounded => {
                vec![format_type(interner, only.ty), "...".to_string()]
            }
            args => args.iter().map(|arg| format_type(interner, arg.ty)).collect(),
        };
        if parts.is_empty() {
            rendered.push_str("[()]");
        } else {
            rendered = format!("{rendered}[{}]", parts.join(", "));
        }
    } else if let Some(args) = &class.type_args {
        let parts: Vec<String> = args.iter().map(|&arg| format_type(interner, arg)).collect();
        rendered = format!("{rendered}[{}]", parts.join(", "));
    }
    if class.is_instantiable {
        rendered = format!("type[{rendered}]");
    }
    rendered
}

fn format_function(interner: &TypeInterner, func: &FunctionType) -> String {
    let params: Vec<String> = func
        .params
        .iter()
        .map(|param| {
            let ty = format_type(interner, param.ty);
            match param.category {
                ParamCategory::Simple => ty,
                ParamCategory::VarPositional => format!("*{ty}"),
                ParamCategory::VarKeyword => format!("**{ty}"),
            }
        })
        .collect();
    format!(
        "({}) -> {}",
        params.join(", "),
        format_type(interner, func.return_type)
    )
}
