use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseType(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrinkGroup(pub String);

/// One chosen item for a course slot. A menu holds at most one selection per
/// course type; picking again for the same type replaces the earlier entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSelection {
    pub course_type: CourseType,
    pub course_label: String,
    pub item_id: Option<String>,
    pub item_name: String,
    pub item_description: String,
    pub item_source: String,
    pub is_custom: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrinkSelection {
    pub drink_group: DrinkGroup,
    pub group_label: String,
    pub item_id: Option<String>,
    pub item_name: String,
    pub item_description: String,
    pub item_source: String,
    pub is_custom: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSelection {
    pub courses: Vec<CourseSelection>,
    pub drinks: Vec<DrinkSelection>,
}

impl MenuSelection {
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty() && self.drinks.is_empty()
    }

    pub fn course_for(&self, course_type: &CourseType) -> Option<&CourseSelection> {
        self.courses.iter().find(|selection| &selection.course_type == course_type)
    }

    pub fn drink_for(&self, group: &DrinkGroup) -> Option<&DrinkSelection> {
        self.drinks.iter().find(|selection| &selection.drink_group == group)
    }
}
