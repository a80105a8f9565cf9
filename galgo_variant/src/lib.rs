pub mod value;

pub use value::*;

#[cfg(test)]
mod tests {
    use super::*;
    use galgo_ids::ActorId;

    #[test]
    fn accessors_are_strict_by_kind() {
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Int(42).as_float(), None);
        assert_eq!(Value::Float(2.5).as_float(), Some(2.5));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::string("hi").as_str(), Some("hi"));
        assert_eq!(Value::Nil.as_str(), None);
    }

    #[test]
    fn number_coercion_widens_ints() {
        assert_eq!(Value::Int(3).as_number(), Some(3.0));
        assert_eq!(Value::Float(1.5).as_number(), Some(1.5));
        assert_eq!(Value::Bool(true).as_number(), None);
    }

    #[test]
    fn truthiness_matches_scripting_rules() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Bool(true).truthy());
        assert!(Value::Int(0).truthy());
        assert!(Value::string("").truthy());
    }

    #[test]
    fn table_get_set() {
        let t = TableRef::new();
        assert!(t.get("missing").is_nil());
        t.set("x", Value::Int(1));
        assert_eq!(t.get("x"), Value::Int(1));
        assert!(t.contains("x"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn table_equality_is_identity() {
        let a = TableRef::new();
        let b = TableRef::new();
        a.set("k", Value::Int(1));
        b.set("k", Value::Int(1));
        assert_ne!(Value::Table(a.clone()), Value::Table(b));
        assert_eq!(Value::Table(a.clone()), Value::Table(a));
    }

    #[test]
    fn deep_clone_severs_aliasing() {
        let inner = TableRef::new();
        inner.set("hp", Value::Int(10));
        let outer = TableRef::new();
        outer.set("stats", Value::Table(inner.clone()));

        let copy = deep_clone_table(&outer);
        let copied_inner = copy.get("stats");
        let copied_inner = copied_inner.as_table().unwrap();
        assert!(!copied_inner.ptr_eq(&inner));

        copied_inner.set("hp", Value::Int(99));
        assert_eq!(inner.get("hp"), Value::Int(10));
    }

    #[test]
    fn deep_clone_preserves_self_cycle() {
        let t = TableRef::new();
        t.set("me", Value::Table(t.clone()));

        let copy = deep_clone_table(&t);
        let inner = copy.get("me");
        let inner = inner.as_table().unwrap();
        assert!(inner.ptr_eq(&copy), "cycle must point back into the clone");
        assert!(!inner.ptr_eq(&t), "cycle must not leak back to the source");
    }

    #[test]
    fn deep_clone_preserves_mutual_cycle() {
        let a = TableRef::new();
        let b = TableRef::new();
        a.set("other", Value::Table(b.clone()));
        b.set("other", Value::Table(a.clone()));

        let ca = deep_clone_table(&a);
        let cb = ca.get("other");
        let cb = cb.as_table().unwrap();
        let back = cb.get("other");
        let back = back.as_table().unwrap();
        assert!(back.ptr_eq(&ca));
        assert!(!cb.ptr_eq(&b));
    }

    #[test]
    fn deep_clone_shared_table_is_cloned_once() {
        // Two keys aliasing one table stay aliased to one (new) table.
        let shared = TableRef::new();
        shared.set("n", Value::Int(7));
        let root = TableRef::new();
        root.set("a", Value::Table(shared.clone()));
        root.set("b", Value::Table(shared.clone()));

        let copy = deep_clone_table(&root);
        let ca = copy.get("a");
        let cb = copy.get("b");
        assert!(ca.as_table().unwrap().ptr_eq(cb.as_table().unwrap()));
        assert!(!ca.as_table().unwrap().ptr_eq(&shared));
    }

    #[test]
    fn deep_clone_keeps_handles_by_value() {
        let t = TableRef::new();
        t.set("target", Value::Actor(ActorId(9)));
        let copy = deep_clone_table(&t);
        assert_eq!(copy.get("target"), Value::Actor(ActorId(9)));
    }

    #[test]
    fn json_roundtrip_primitives() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"name":"blob","hp":12,"speed":1.5,"brave":true,"tags":["a","b"]}"#,
        )
        .unwrap();
        let value = Value::from_json_value(&json);
        let table = value.as_table().unwrap();
        assert_eq!(table.get("name"), Value::string("blob"));
        assert_eq!(table.get("hp"), Value::Int(12));
        assert_eq!(table.get("speed"), Value::Float(1.5));
        assert_eq!(table.get("brave"), Value::Bool(true));

        let tags = table.get("tags");
        let tags = tags.as_table().unwrap();
        assert_eq!(tags.get("1"), Value::string("a"));
        assert_eq!(tags.get("2"), Value::string("b"));
    }

    #[test]
    fn json_view_cuts_cycles() {
        let t = TableRef::new();
        t.set("me", Value::Table(t.clone()));
        let json = Value::Table(t).to_json_value();
        assert_eq!(json["me"], serde_json::json!("<cycle>"));
    }
}
