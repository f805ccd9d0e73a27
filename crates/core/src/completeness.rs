//! Menu completeness rules.
//!
//! An option is ready to quote once its menu satisfies the package's course
//! and drink configuration. Completeness gates email generation and the
//! composer wizard's step advance; it never blocks editing.

use crate::domain::menu::MenuSelection;
use crate::domain::option::{OfferOption, OptionLabel};
use crate::domain::package::{Package, PackageId};

/// A selection counts once it points at a catalog item or is a custom entry.
fn has_item(item_id: &Option<String>, is_custom: bool) -> bool {
    is_custom || item_id.as_ref().is_some_and(|id| !id.is_empty())
}

pub fn courses_complete(menu: &MenuSelection, package: &Package) -> bool {
    let mut required = package.required_courses().peekable();
    if required.peek().is_none() {
        // No declared requirements: anything configured counts as complete.
        return menu
            .courses
            .iter()
            .any(|selection| has_item(&selection.item_id, selection.is_custom));
    }

    required.all(|slot| {
        menu.course_for(&slot.course_type)
            .is_some_and(|selection| has_item(&selection.item_id, selection.is_custom))
    })
}

pub fn drinks_complete(menu: &MenuSelection, package: &Package) -> bool {
    package.choice_drinks().all(|slot| {
        menu.drink_for(&slot.group)
            .is_some_and(|selection| has_item(&selection.item_id, selection.is_custom))
    })
}

pub fn is_menu_complete(option: &OfferOption, package: &Package) -> bool {
    courses_complete(&option.menu, package) && drinks_complete(&option.menu, package)
}

/// Labels of active, packaged options whose menu is not yet complete. An
/// option whose package cannot be resolved in the catalog is reported as
/// incomplete rather than silently passed.
pub fn incomplete_active_options(options: &[OfferOption], catalog: &[Package]) -> Vec<OptionLabel> {
    options
        .iter()
        .filter(|option| option.is_active && option.has_package())
        .filter(|option| {
            let complete = option
                .package_id
                .as_ref()
                .and_then(|id| find_package(catalog, id))
                .is_some_and(|package| is_menu_complete(option, package));
            !complete
        })
        .map(|option| option.label)
        .collect()
}

fn find_package<'a>(catalog: &'a [Package], id: &PackageId) -> Option<&'a Package> {
    catalog.iter().find(|package| &package.id == id)
}
