//! Best-effort lexical rewrite of ES module export syntax, for the text tier
//! of the loader. The output is a function expression that takes an exports
//! object, runs the module body and returns the object.
//!
//! Only top-level export statements are turned into property assignments;
//! remote bundles are often minified and are never parsed here. Imports
//! inside the fetched text are left untouched, so modules with their own
//! imports still fail this tier.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EXPORT_DEFAULT: Regex = Regex::new(r"(^|[;\s}])export\s+default\s+").unwrap();
    static ref EXPORT_DECL: Regex = Regex::new(
        r"(^|[;\s}])export\s+(const|let|var|function\*?|async\s+function|class)\s+([A-Za-z_$][\w$]*)"
    )
    .unwrap();
    static ref EXPORT_LIST: Regex = Regex::new(r"(^|[;\s}])export\s*\{([^}]*)\}\s*;?").unwrap();
}

pub const EXPORTS_PARAM: &str = "__exports";

pub fn rewrite_esm_exports(source: &str) -> String {
    let mut trailer: Vec<String> = Vec::new();

    let body = EXPORT_LIST.replace_all(source, |caps: &regex::Captures| {
        for item in caps[2].split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (local, exported) = match item.split_once(" as ") {
                Some((local, exported)) => (local.trim(), exported.trim()),
                None => (item, item),
            };
            trailer.push(format!("{}[{:?}] = {};", EXPORTS_PARAM, exported, local));
        }
        caps[1].to_string()
    });

    let body = EXPORT_DECL.replace_all(&body, |caps: &regex::Captures| {
        trailer.push(format!("{}[{:?}] = {};", EXPORTS_PARAM, &caps[3], &caps[3]));
        format!("{}{} {}", &caps[1], &caps[2], &caps[3])
    });

    let body = EXPORT_DEFAULT.replace_all(&body, |caps: &regex::Captures| {
        format!("{}{}[\"default\"] = ", &caps[1], EXPORTS_PARAM)
    });

    format!(
        "(function ({}) {{\n{}\n{}\nreturn {};\n}})",
        EXPORTS_PARAM,
        body,
        trailer.join("\n"),
        EXPORTS_PARAM
    )
}
