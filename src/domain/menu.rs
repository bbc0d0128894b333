//! Category navigation menu
//!
//! Categories arrive as a flat list with parent links; the storefront header
//! needs them as a tree with labels in the visitor's language.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use crate::domain::value_objects::{Locale, LocalizedText};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub slug: String,
    pub name: LocalizedText,
    pub position: i32,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MenuEntry {
    pub id: Uuid,
    pub slug: String,
    pub label: String,
    pub tags: Vec<String>,
    pub children: Vec<MenuEntry>,
}

/// Build the menu tree. Categories whose parent is absent from `categories`
/// are promoted to the top level, as is one member of every parent cycle, so
/// each category appears exactly once. Siblings are ordered by position, then label.
pub fn build_menu(categories: &[Category], locale: Locale) -> Vec<MenuEntry> {
    let known: HashSet<Uuid> = categories.iter().map(|c| c.id).collect();
    let mut parents: HashMap<Uuid, Option<Uuid>> = categories
        .iter()
        .map(|c| (c.id, c.parent_id.filter(|p| known.contains(p) && *p != c.id)))
        .collect();
    loop {
        let reached = reachable(&parents);
        let cut = categories
            .iter()
            .filter(|c| !reached.contains(&c.id))
            .min_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.get(locale).cmp(b.name.get(locale))));
        match cut {
            Some(c) => { parents.insert(c.id, None); }
            None => break,
        }
    }
    let mut by_parent: HashMap<Option<Uuid>, Vec<&Category>> = HashMap::new();
    for category in categories {
        by_parent.entry(parents.get(&category.id).copied().flatten()).or_default().push(category);
    }
    build_level(None, &by_parent, locale)
}

/// Ids reachable by walking down from the top level.
fn reachable(parents: &HashMap<Uuid, Option<Uuid>>) -> HashSet<Uuid> {
    let mut children: HashMap<Option<Uuid>, Vec<Uuid>> = HashMap::new();
    for (&id, &parent) in parents {
        children.entry(parent).or_default().push(id);
    }
    let mut reached = HashSet::new();
    let mut stack: Vec<Uuid> = children.get(&None).cloned().unwrap_or_default();
    while let Some(id) = stack.pop() {
        if reached.insert(id) {
            stack.extend(children.get(&Some(id)).into_iter().flatten().copied());
        }
    }
    reached
}

fn build_level(parent: Option<Uuid>, by_parent: &HashMap<Option<Uuid>, Vec<&Category>>, locale: Locale) -> Vec<MenuEntry> {
    let Some(siblings) = by_parent.get(&parent) else { return Vec::new() };
    let mut siblings = siblings.clone();
    siblings.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.get(locale).cmp(b.name.get(locale))));
    siblings
        .into_iter()
        .map(|c| MenuEntry {
            id: c.id,
            slug: c.slug.clone(),
            label: c.name.get(locale).to_string(),
            tags: c.tags.clone(),
            children: build_level(Some(c.id), by_parent, locale),
        })
        .collect()
}

/// Depth-first walk of the tree as `(depth, entry)`, roots at depth 0.
pub fn flatten(entries: &[MenuEntry]) -> Vec<(usize, &MenuEntry)> {
    fn walk<'a>(entries: &'a [MenuEntry], depth: usize, out: &mut Vec<(usize, &'a MenuEntry)>) {
        for entry in entries {
            out.push((depth, entry));
            walk(&entry.children, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    walk(entries, 0, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(parent: Option<Uuid>, slug: &str, el: &str, en: &str, position: i32) -> Category {
        Category {
            id: Uuid::new_v4(), parent_id: parent, slug: slug.into(),
            name: LocalizedText::new(el, Some(en.into())), position, tags: vec![],
        }
    }

    #[test]
    fn test_tree_and_ordering() {
        let boxes = category(None, "boxes", "Κουτιά", "Boxes", 1);
        let bags = category(None, "bags", "Σακούλες", "Bags", 0);
        let pizza = category(Some(boxes.id), "pizza", "Πίτσας", "Pizza", 2);
        let cake = category(Some(boxes.id), "cake", "Γλυκών", "Cake", 2);
        let menu = build_menu(&[pizza, boxes, cake, bags], Locale::En);
        let labels: Vec<_> = flatten(&menu).into_iter().map(|(d, e)| (d, e.label.as_str())).collect();
        assert_eq!(labels, vec![(0, "Bags"), (0, "Boxes"), (1, "Cake"), (1, "Pizza")]);
    }

    #[test]
    fn test_orphans_promoted() {
        let orphan = category(Some(Uuid::new_v4()), "tape", "Ταινίες", "Tape", 0);
        let menu = build_menu(&[orphan], Locale::El);
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0].label, "Ταινίες");
    }

    #[test]
    fn test_self_parent_is_root() {
        let mut c = category(None, "cups", "Ποτήρια", "Cups", 0);
        c.parent_id = Some(c.id);
        assert_eq!(build_menu(&[c], Locale::En).len(), 1);
    }

    #[test]
    fn test_parent_cycle_is_broken() {
        let mut cups = category(None, "cups", "Ποτήρια", "Cups", 0);
        let mut lids = category(None, "lids", "Καπάκια", "Lids", 1);
        cups.parent_id = Some(lids.id);
        lids.parent_id = Some(cups.id);
        let straws = category(Some(lids.id), "straws", "Καλαμάκια", "Straws", 0);
        let menu = build_menu(&[lids, straws, cups], Locale::En);
        let labels: Vec<_> = flatten(&menu).into_iter().map(|(d, e)| (d, e.label.as_str())).collect();
        assert_eq!(labels, vec![(0, "Cups"), (1, "Lids"), (2, "Straws")]);
    }

    #[test]
    fn test_longer_cycle_keeps_every_category() {
        let mut a = category(None, "a", "Α", "A", 2);
        let mut b = category(None, "b", "Β", "B", 0);
        let mut c = category(None, "c", "Γ", "C", 1);
        a.parent_id = Some(b.id);
        b.parent_id = Some(c.id);
        c.parent_id = Some(a.id);
        let root = category(None, "bags", "Σακούλες", "Bags", 5);
        let menu = build_menu(&[a, b, c, root], Locale::En);
        let labels: Vec<_> = flatten(&menu).into_iter().map(|(d, e)| (d, e.label.as_str())).collect();
        assert_eq!(labels, vec![(0, "B"), (1, "A"), (2, "C"), (0, "Bags")]);
    }

    #[test]
    fn test_empty() {
        assert!(build_menu(&[], Locale::El).is_empty());
        assert!(flatten(&[]).is_empty());
    }
}
