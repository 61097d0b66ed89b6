//! User-visible builtin names and their runtime ABI symbols.

/// Translate a user-visible builtin name to its runtime symbol
/// (`list_zip` -> `mesh_list_zip`).
pub fn map_builtin_name(name: &str) -> &'static str {
    match name {
        "println" => "mesh_println",
        "print" => "mesh_print",
        "readline" => "mesh_readline",
        "range" => "mesh_range",
        "sleep" => "mesh_sleep",
        "self_pid" => "mesh_actor_self",
        "panic" => "mesh_panic",
        "http_serve" => "mesh_http_serve",
        "ws_serve" => "mesh_ws_serve",
        "ws_serve_tls" => "mesh_ws_serve_tls",
        "ws_send" => "mesh_ws_send",
        "ws_close" => "mesh_ws_close",
        "list_zip" => "mesh_list_zip",
        "list_flat_map" => "mesh_list_flat_map",
        "map_merge" => "mesh_map_merge",
        "map_to_list" => "mesh_map_to_list",
        "set_from_list" => "mesh_set_from_list",
        _ => {
            // Unknown names pass through; the linker catches genuine
            // mistakes, and tests pin the table above.
            Box::leak(format!("mesh_{name}").into_boxed_str())
        }
    }
}

/// Runtime symbol for a stdlib method on a built-in receiver type.
pub fn builtin_method_symbol(head: &str, method: &str) -> Option<&'static str> {
    Some(match (head, method) {
        ("String", "len") => "mesh_string_len",
        ("String", "concat") => "mesh_string_concat",
        ("String", "contains") => "mesh_string_contains",
        ("String", "starts_with") => "mesh_string_starts_with",
        ("String", "ends_with") => "mesh_string_ends_with",
        ("String", "split") => "mesh_string_split",
        ("String", "trim") => "mesh_string_trim",
        ("String", "to_upper") => "mesh_string_to_upper",
        ("String", "to_lower") => "mesh_string_to_lower",
        ("String", "replace") => "mesh_string_replace",
        ("String", "slice") => "mesh_string_slice",
        ("String", "to_int") => "mesh_string_to_int",
        ("List", "len") => "mesh_list_len",
        ("List", "push") => "mesh_list_push",
        ("List", "get") => "mesh_list_get",
        ("List", "head") => "mesh_list_head",
        ("List", "tail") => "mesh_list_tail",
        ("List", "reverse") => "mesh_list_reverse",
        ("List", "sort") => "mesh_list_sort",
        ("List", "contains") => "mesh_list_contains",
        ("List", "zip") => "mesh_list_zip",
        ("List", "flat_map") => "mesh_list_flat_map",
        ("List", "map") => "mesh_list_map",
        ("List", "filter") => "mesh_list_filter",
        ("List", "fold") => "mesh_list_fold",
        ("Iter", "map") => "mesh_list_map",
        ("Iter", "filter") => "mesh_list_filter",
        ("Iter", "collect") => "mesh_iter_collect",
        ("Iter", "count") => "mesh_list_len",
        ("Map", "len") => "mesh_map_len",
        ("Map", "get") => "mesh_map_get",
        ("Map", "insert") => "mesh_map_insert",
        ("Map", "remove") => "mesh_map_remove",
        ("Map", "contains_key") => "mesh_map_contains_key",
        ("Map", "merge") => "mesh_map_merge",
        ("Map", "to_list") => "mesh_map_to_list",
        ("Set", "len") => "mesh_set_len",
        ("Set", "add") => "mesh_set_add",
        ("Set", "remove") => "mesh_set_remove",
        ("Set", "contains") => "mesh_set_contains",
        ("Set", "to_list") => "mesh_set_to_list",
        ("Int", "abs") => "mesh_int_abs",
        ("Int", "to_float") => "mesh_int_to_float",
        ("Float", "abs") => "mesh_float_abs",
        ("Float", "sqrt") => "mesh_float_sqrt",
        ("Float", "floor") => "mesh_float_floor",
        ("Float", "ceil") => "mesh_float_ceil",
        ("Float", "round") => "mesh_float_round",
        ("Float", "to_int") => "mesh_float_to_int",
        ("Option", "is_some") => "mesh_option_is_some",
        ("Option", "is_none") => "mesh_option_is_none",
        ("Option", "unwrap_or") => "mesh_option_unwrap_or",
        ("Result", "is_ok") => "mesh_result_is_ok",
        ("Result", "is_err") => "mesh_result_is_err",
        ("Result", "unwrap_or") => "mesh_option_unwrap_or",
        _ => return None,
    })
}

/// Runtime symbol for a stdlib-module-qualified function (`Math.sqrt`).
pub fn stdlib_module_symbol(module: &str, name: &str) -> Option<&'static str> {
    Some(match (module, name) {
        ("Math", "sqrt") => "mesh_float_sqrt",
        ("Math", "sin") => "mesh_float_sin",
        ("Math", "cos") => "mesh_float_cos",
        ("Math", "log") => "mesh_float_log",
        ("Math", "pow") => "mesh_float_pow",
        ("Math", "abs") => "mesh_int_abs",
        ("Map", "new") => "mesh_map_new",
        ("Map", "new_str") => "mesh_map_new_str",
        ("Map", "from_list") => "mesh_map_from_list",
        ("Set", "new") => "mesh_set_new",
        ("Set", "from_list") => "mesh_set_from_list",
        ("String", "from_int") => "mesh_int_to_string",
        ("String", "from_float") => "mesh_float_to_string",
        ("Time", "now_ms") => "mesh_time_now_ms",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_normative_abi_names() {
        assert_eq!(map_builtin_name("list_zip"), "mesh_list_zip");
        assert_eq!(map_builtin_name("ws_serve_tls"), "mesh_ws_serve_tls");
        assert_eq!(map_builtin_name("map_merge"), "mesh_map_merge");
        assert_eq!(map_builtin_name("set_from_list"), "mesh_set_from_list");
    }

    #[test]
    fn method_table_covers_spec_ops() {
        assert_eq!(builtin_method_symbol("List", "zip"), Some("mesh_list_zip"));
        assert_eq!(
            builtin_method_symbol("List", "flat_map"),
            Some("mesh_list_flat_map")
        );
        assert_eq!(builtin_method_symbol("Map", "merge"), Some("mesh_map_merge"));
        assert_eq!(builtin_method_symbol("Nope", "zip"), None);
    }
}
