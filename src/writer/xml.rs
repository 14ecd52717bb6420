//! Header XML assembly for single-image containers.

use std::borrow::Cow;

use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::container::PLACEHOLDER_BLOCK_ID;
use crate::error::{MicroImgError, Result};

const ELEMENT_TAG: &[u8] = b"Element";
const NAME_ATTR: &[u8] = b"Name";

fn xml_error(e: impl std::fmt::Display) -> MicroImgError {
    MicroImgError::MalformedMetadata(format!("element XML: {}", e))
}

/// Rename the first `<Element Name="from">` in `fragment` to `to`.
///
/// Everything else in the fragment is written back unchanged. A fragment
/// without a matching element is returned as is.
pub fn rename_element(fragment: &str, from: &str, to: &str) -> Result<String> {
    let mut reader = Reader::from_str(fragment);
    reader.config_mut().check_end_names = false;
    let mut writer = Writer::new(Vec::with_capacity(fragment.len() + to.len()));
    let mut renamed = false;

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        let event = match event {
            Event::Eof => break,
            Event::Start(e) if !renamed && has_name(&e, from)? => {
                renamed = true;
                Event::Start(with_name(&e, to)?)
            }
            Event::Empty(e) if !renamed && has_name(&e, from)? => {
                renamed = true;
                Event::Empty(with_name(&e, to)?)
            }
            other => other,
        };
        writer.write_event(event).map_err(xml_error)?;
    }

    if !renamed {
        log::warn!("No <Element Name={:?}> found, fragment left unchanged", from);
    }
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn has_name(element: &BytesStart<'_>, name: &str) -> Result<bool> {
    if element.name().as_ref() != ELEMENT_TAG {
        return Ok(false);
    }
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.as_ref() == NAME_ATTR {
            let raw = std::str::from_utf8(&attr.value).map_err(xml_error)?;
            return Ok(unescape(raw).map_err(xml_error)? == name);
        }
    }
    Ok(false)
}

fn with_name(element: &BytesStart<'_>, name: &str) -> Result<BytesStart<'static>> {
    let mut renamed = element.to_owned();
    renamed.clear_attributes();
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.as_ref() == NAME_ATTR {
            renamed.push_attribute(("Name", name));
        } else {
            renamed.push_attribute(attr);
        }
    }
    Ok(renamed)
}

/// Wrap a renamed element fragment in the container header document.
pub fn build_header_xml(save_name: &str, output_path: &str, uuid: &str, fragment: &str) -> String {
    format!(
        concat!(
            "<LMSDataContainerHeader Version=\"2\">",
            "<Element CopyOption=\"1\" Name=\"{name}\" UniqueID=\"{uuid}\" Visibility=\"1\"> ",
            "<Data><Experiment IsSavedFlag=\"1\" Path=\"{path}\"/></Data>",
            "<Memory MemoryBlockID=\"{block}\" Size=\"0\"/>",
            "<Children>{children}</Children>",
            "</Element></LMSDataContainerHeader>"
        ),
        name = escape(save_name),
        uuid = uuid,
        path = escape(output_path),
        block = PLACEHOLDER_BLOCK_ID,
        children = fragment,
    )
}

/// Whitespace normalisation expected by the reading software.
///
/// Newlines are removed, whitespace runs collapse to one space, then CRLF
/// follows `</Data>` and `</LMSDataContainerHeader>`.
pub fn normalize_xml(xml: &str) -> String {
    let without_newlines: Cow<'_, str> = if xml.contains('\n') {
        Cow::Owned(xml.replace('\n', ""))
    } else {
        Cow::Borrowed(xml)
    };
    without_newlines
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("</Data>", "</Data>\r\n")
        .replace("</LMSDataContainerHeader>", "</LMSDataContainerHeader>\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_only_first_match() {
        let fragment = concat!(
            r#"<Element Name="Other" Visibility="1"><Data/></Element>"#,
            r#"<Element Name="Series001" Visibility="1"><Children>"#,
            r#"<Element Name="Series001"/></Children></Element>"#
        );
        let out = rename_element(fragment, "Series001", "sample_Series001").unwrap();
        assert_eq!(
            out,
            concat!(
                r#"<Element Name="Other" Visibility="1"><Data/></Element>"#,
                r#"<Element Name="sample_Series001" Visibility="1"><Children>"#,
                r#"<Element Name="Series001"/></Children></Element>"#
            )
        );
    }

    #[test]
    fn test_rename_escaped_names() {
        let fragment = r#"<Element Name="A &amp; B"><Data>x &lt; y</Data></Element>"#;
        let out = rename_element(fragment, "A & B", "C<D").unwrap();
        assert_eq!(out, r#"<Element Name="C&lt;D"><Data>x &lt; y</Data></Element>"#);
    }

    #[test]
    fn test_rename_without_match_is_identity() {
        let fragment = r#"<Element Name="X"><Data/></Element>"#;
        assert_eq!(rename_element(fragment, "Y", "Z").unwrap(), fragment);
    }

    #[test]
    fn test_normalize_xml() {
        let xml = "<Root>\n  <Data>\r\n a  b</Data>\t<X/></LMSDataContainerHeader>";
        assert_eq!(
            normalize_xml(xml),
            "<Root> <Data> a b</Data>\r\n <X/></LMSDataContainerHeader>\r\n"
        );
    }

    #[test]
    fn test_header_template() {
        let xml = normalize_xml(&build_header_xml("img", "/out/img.lif", "u-1", "<Element/>"));
        assert!(xml.starts_with(r#"<LMSDataContainerHeader Version="2"><Element CopyOption="1" Name="img" UniqueID="u-1""#));
        assert!(xml.contains(r#"<Data><Experiment IsSavedFlag="1" Path="/out/img.lif"/></Data>"#));
        assert!(xml.contains(r#"<Memory MemoryBlockID="MemBlock_221" Size="0"/><Children><Element/></Children>"#));
        assert!(xml.ends_with("</Element></LMSDataContainerHeader>\r\n"));
        assert_eq!(xml.matches("\r\n").count(), 2);
    }
}
