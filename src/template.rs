use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Matches `$$`, `$NAME`, and `${NAME}`. Any `$` the pattern does not
/// consume is malformed template text.
fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$(?:(\$)|([A-Za-z_][A-Za-z0-9_]*)|\{([A-Za-z_][A-Za-z0-9_]*)\})")
            .expect("placeholder regex is valid")
    })
}

/// Substitutes `$NAME` / `${NAME}` placeholders with values from `vars`,
/// with `$$` as a literal-dollar escape.
///
/// Templates are hand-edited files, so this is a pure string assembly:
/// no expression evaluation, no code execution. A placeholder with no
/// entry in `vars` is an error rather than being dropped or left in the
/// output, as is a stray `$` that forms no valid placeholder.
pub fn substitute(template: &str, vars: &HashMap<&str, &str>) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let whole = caps.get(0).expect("regex match has a whole capture");
        push_literal(&template[last_end..whole.start()], &mut output)?;
        last_end = whole.end();

        if caps.get(1).is_some() {
            output.push('$');
            continue;
        }

        let name = caps
            .get(2)
            .or_else(|| caps.get(3))
            .expect("placeholder match has a name capture")
            .as_str();
        match vars.get(name) {
            Some(value) => output.push_str(value),
            None => {
                return Err(anyhow::anyhow!(
                    "template references unknown placeholder '{}'",
                    name
                ))
            }
        }
    }

    push_literal(&template[last_end..], &mut output)?;
    Ok(output)
}

fn push_literal(text: &str, output: &mut String) -> Result<()> {
    if let Some(pos) = text.find('$') {
        return Err(anyhow::anyhow!(
            "invalid '$' in template (byte offset {} within segment); use '$$' for a literal dollar",
            pos
        ));
    }
    output.push_str(text);
    Ok(())
}
