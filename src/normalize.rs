use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One canonical department and the labels it has been stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Department {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub aliases: Vec<String>,
}

/// An alias claimed by more than one department. Alias sets are expected to
/// be disjoint; when they are not, the department declared first wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasOverlap {
    pub alias: String,
    pub winner: String,
    pub shadowed: String,
}

/// Case-insensitive, exact-match lookup from free-text label to canonical id.
#[derive(Debug, Clone)]
pub struct AliasTable {
    departments: Vec<Department>,
    index: HashMap<String, usize>,
    overlaps: Vec<AliasOverlap>,
}

fn fold(label: &str) -> String {
    label.trim().to_lowercase()
}

impl AliasTable {
    pub fn new(departments: Vec<Department>) -> Self {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut overlaps = Vec::new();

        for (position, department) in departments.iter().enumerate() {
            for alias in &department.aliases {
                let key = fold(alias);
                if key.is_empty() {
                    continue;
                }
                match index.get(&key) {
                    Some(&owner) if owner != position => {
                        let winner = departments[owner].id.clone();
                        log::warn!(
                            "Alias '{alias}' is claimed by both '{winner}' and '{}'; '{winner}' wins",
                            department.id
                        );
                        overlaps.push(AliasOverlap {
                            alias: alias.clone(),
                            winner,
                            shadowed: department.id.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        index.insert(key, position);
                    }
                }
            }
        }

        Self {
            departments,
            index,
            overlaps,
        }
    }

    /// Canonical id for `raw`, or `None` when the label is blank or unknown.
    pub fn normalize(&self, raw: Option<&str>) -> Option<&str> {
        let key = fold(raw?);
        if key.is_empty() {
            return None;
        }
        self.index
            .get(&key)
            .map(|&position| self.departments[position].id.as_str())
    }

    pub fn departments(&self) -> &[Department] {
        &self.departments
    }

    pub fn overlaps(&self) -> &[AliasOverlap] {
        &self.overlaps
    }

    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.departments
            .iter()
            .find(|d| d.id == id)
            .and_then(|d| d.name.as_deref())
            .unwrap_or(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dept(id: &str, aliases: &[&str]) -> Department {
        Department {
            id: id.to_string(),
            name: None,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn table() -> AliasTable {
        AliasTable::new(vec![
            dept("cse", &["cse", "CSE", "Computer Science and Engineering"]),
            dept("ai-ds", &["AI and DS", "AIDS"]),
        ])
    }

    #[test]
    fn matches_any_alias_case_insensitively() {
        let table = table();
        assert_eq!(table.normalize(Some("CSE")), Some("cse"));
        assert_eq!(table.normalize(Some("cse")), Some("cse"));
        assert_eq!(
            table.normalize(Some("COMPUTER SCIENCE AND ENGINEERING")),
            Some("cse")
        );
        assert_eq!(table.normalize(Some("ai and ds")), Some("ai-ds"));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(table().normalize(Some("  AIDS \n")), Some("ai-ds"));
    }

    #[test]
    fn blank_or_missing_label_is_none() {
        let table = table();
        assert_eq!(table.normalize(None), None);
        assert_eq!(table.normalize(Some("")), None);
        assert_eq!(table.normalize(Some("   ")), None);
    }

    #[test]
    fn no_fuzzy_matching() {
        let table = table();
        assert_eq!(table.normalize(Some("Computer Science")), None);
        assert_eq!(table.normalize(Some("CSE ")), Some("cse"));
        assert_eq!(table.normalize(Some("C.S.E")), None);
    }

    #[test]
    fn first_declared_department_wins_overlap() {
        let table = AliasTable::new(vec![
            dept("cse", &["CS"]),
            dept("cs", &["cs", "Comp Sci"]),
        ]);
        assert_eq!(table.normalize(Some("cs")), Some("cse"));
        assert_eq!(table.normalize(Some("Comp Sci")), Some("cs"));
        assert_eq!(table.overlaps().len(), 1);
        assert_eq!(table.overlaps()[0].alias, "cs");
    }

    #[test]
    fn repeated_alias_within_one_department_is_not_an_overlap() {
        let table = AliasTable::new(vec![dept("cse", &["CSE", "cse"])]);
        assert!(table.overlaps().is_empty());
    }
}
