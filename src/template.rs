//! Placeholder content for freshly created projects.

use crate::util::escape_xml;

/// A minimal XHTML page whose title and heading are `title`.
pub fn placeholder_page(title: &str) -> String {
    let title = escape_xml(title);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
  <head>
    <title>{title}</title>
  </head>
  <body>
    <h1>{title}</h1>
  </body>
</html>
"#
    )
}
