use crate::model::{Entity, EntityId};

pub fn append<T: Entity>(items: &mut Vec<T>, created: T) {
    items.push(created);
}

/// Swaps in the server copy for the entry with the same id. Unknown ids leave the list as is.
pub fn replace<T: Entity>(items: &mut [T], updated: T) {
    if let Some(slot) = items.iter_mut().find(|item| item.id() == updated.id()) {
        *slot = updated;
    }
}

pub fn remove<T: Entity>(items: &mut Vec<T>, id: EntityId) {
    items.retain(|item| item.id() != id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;
    use pretty_assertions::assert_eq;

    fn project(id: EntityId, name: &str) -> Project {
        serde_json::from_value(serde_json::json!({"id": id, "name": name})).unwrap()
    }

    fn names(items: &[Project]) -> Vec<&str> {
        items.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn replace_only_touches_matching_id() {
        let mut items = vec![project(1, "a"), project(2, "b"), project(3, "c")];

        replace(&mut items, project(2, "B"));

        assert_eq!(names(&items), vec!["a", "B", "c"]);
    }

    #[test]
    fn replace_unknown_id_is_noop() {
        let mut items = vec![project(1, "a")];

        replace(&mut items, project(9, "z"));

        assert_eq!(names(&items), vec!["a"]);
    }

    #[test]
    fn remove_filters_by_id() {
        let mut items = vec![project(1, "a"), project(2, "b")];

        remove(&mut items, 1);
        remove(&mut items, 42);

        assert_eq!(names(&items), vec!["b"]);
    }

    #[test]
    fn append_keeps_order() {
        let mut items = vec![project(1, "a")];

        append(&mut items, project(2, "b"));

        assert_eq!(names(&items), vec!["a", "b"]);
    }
}
