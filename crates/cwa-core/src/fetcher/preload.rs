//! Preload hints sent with each hop of a route resolution.
//!
//! Each list names the links, relative to the requested resource, that the server
//! may push or inline along with the response.

pub const ROUTE: &[&str] = &[
    "/page/layout/componentGroups/*/componentPositions/*/component",
    "/page/componentGroups/*/componentPositions/*/component",
    "/pageData/page/layout/componentGroups/*/componentPositions/*/component",
    "/pageData/page/componentGroups/*/componentPositions/*/component",
];

pub const PAGE_DATA: &[&str] = &[
    "/page/layout/componentGroups/*/componentPositions/*/component",
    "/page/componentGroups/*/componentPositions/*/component",
];

pub const PAGE: &[&str] = &[
    "/layout/componentGroups/*/componentPositions/*/component",
    "/componentGroups/*/componentPositions/*/component",
];

pub const LAYOUT: &[&str] = &["/componentGroups/*/componentPositions/*/component"];

pub const COMPONENT_GROUP: &[&str] = &["/componentPositions/*/component"];

pub const COMPONENT_POSITION: &[&str] = &["/component"];

pub const COMPONENT: &[&str] = &["/componentGroups/*/componentPositions/*/component"];
