//! Parser for single C declarations as they appear in registry `<member>`
//! and `<param>` elements.

use crate::error::TypeError;
use crate::types::VulkanType;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Star,
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>, TypeError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '[' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ']' => {
                chars.next();
                tokens.push(Token::Close);
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(TypeError::Declaration {
                    decl: text.to_string(),
                    reason: format!("unexpected character `{other}`"),
                })
            }
        }
    }
    Ok(tokens)
}

/// Parse `[const] [struct] T [* [const]]* name ([N])*`.
pub fn parse(text: &str) -> Result<VulkanType, TypeError> {
    let fail = |reason: &str| TypeError::Declaration {
        decl: text.to_string(),
        reason: reason.to_string(),
    };

    let tokens = tokenize(text)?;
    let mut pos = 0;
    let mut is_const = false;

    while let Some(Token::Ident(word)) = tokens.get(pos) {
        match word.as_str() {
            "const" => is_const = true,
            "struct" => {}
            _ => break,
        }
        pos += 1;
    }

    let type_name = match tokens.get(pos) {
        Some(Token::Ident(name)) => name.clone(),
        _ => return Err(fail("missing type name")),
    };
    pos += 1;

    let mut depth: u8 = 0;
    let mut const_between = false;
    loop {
        match tokens.get(pos) {
            Some(Token::Star) => {
                depth += 1;
                pos += 1;
            }
            Some(Token::Ident(word)) if word == "const" => {
                if depth == 0 {
                    is_const = true;
                } else {
                    const_between = true;
                }
                pos += 1;
            }
            _ => break,
        }
    }
    if depth > 2 {
        return Err(fail("more than two levels of indirection"));
    }

    let param_name = match tokens.get(pos) {
        Some(Token::Ident(name)) => name.clone(),
        _ => return Err(fail("missing parameter name")),
    };
    pos += 1;

    let mut dims = Vec::new();
    while let Some(Token::Open) = tokens.get(pos) {
        match (tokens.get(pos + 1), tokens.get(pos + 2)) {
            (Some(Token::Ident(dim)), Some(Token::Close)) => dims.push(dim.clone()),
            _ => return Err(fail("malformed array dimension")),
        }
        pos += 3;
    }
    if pos != tokens.len() {
        return Err(fail("trailing tokens"));
    }

    let mut ty = VulkanType::new(type_name, param_name);
    ty.is_const = is_const || const_between;
    ty.pointer_indirection_levels = depth;
    ty.is_pointer_to_const_pointer = depth == 2 && const_between;
    ty.static_arr_expr = combine_dims(&dims);
    Ok(ty)
}

/// Flatten `[3][4]` into a single element count.
fn combine_dims(dims: &[String]) -> Option<String> {
    match dims {
        [] => None,
        [one] => Some(one.clone()),
        many => {
            let numeric: Option<Vec<u64>> = many.iter().map(|d| d.parse().ok()).collect();
            Some(match numeric {
                Some(values) => values.iter().product::<u64>().to_string(),
                None => many.join(" * "),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_array() {
        let ty = parse("const char* const* ppEnabledLayerNames").unwrap();
        assert_eq!(ty.type_name, "char");
        assert_eq!(ty.param_name, "ppEnabledLayerNames");
        assert!(ty.is_const);
        assert_eq!(ty.pointer_indirection_levels, 2);
        assert!(ty.is_pointer_to_const_pointer);
        assert!(ty.is_string_array());
    }

    #[test]
    fn parses_output_pointer() {
        let ty = parse("VkInstance* pInstance").unwrap();
        assert!(!ty.is_const);
        assert_eq!(ty.pointer_indirection_levels, 1);
        assert!(ty.is_output());
    }

    #[test]
    fn parses_static_arrays() {
        let ty = parse("char deviceName[VK_MAX_PHYSICAL_DEVICE_NAME_SIZE]").unwrap();
        assert_eq!(ty.static_arr_expr.as_deref(), Some("VK_MAX_PHYSICAL_DEVICE_NAME_SIZE"));
        let m = parse("float matrix[3][4]").unwrap();
        assert_eq!(m.static_arr_expr.as_deref(), Some("12"));
    }

    #[test]
    fn parses_struct_keyword_and_void_pointer() {
        let ty = parse("const struct VkBaseInStructure* pNext").unwrap();
        assert_eq!(ty.type_name, "VkBaseInStructure");
        assert!(ty.is_next_pointer());
        let data = parse("void** ppData").unwrap();
        assert_eq!(data.pointer_indirection_levels, 2);
        assert!(!data.is_pointer_to_const_pointer);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("uint32_t").is_err());
        assert!(parse("int (*fn)(void)").is_err());
        assert!(parse("int*** p").is_err());
    }
}
