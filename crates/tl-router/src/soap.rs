//! Tiger SOAP codec.
//!
//! The Tiger `checkIn` operation takes the check-in document as an escaped
//! string inside `XMLString`, so the inner document is escaped twice on the
//! wire: once for its own values and once as a whole when wrapped.

/// Escape the five XML special characters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Tiger's boolean spelling.
pub fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Build the `<checkinresults>` document.
///
/// `optional` nodes are written in the given order between `room` and
/// `wsuserkey`. A `None` value writes nothing at all, not an empty element.
pub fn build_inner_xml(
    resno: &str,
    site: &str,
    room: &str,
    ws_user_key: &str,
    optional: &[(&str, Option<String>)],
) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(r#"<checkinresults resno="{}">"#, escape(resno)));
    push_node(&mut xml, "site", site);
    push_node(&mut xml, "room", room);

    for (name, value) in optional {
        if let Some(value) = value {
            push_node(&mut xml, name, value);
        }
    }

    push_node(&mut xml, "wsuserkey", ws_user_key);
    xml.push_str("</checkinresults>");
    xml
}

fn push_node(xml: &mut String, name: &str, value: &str) {
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&escape(value));
    xml.push_str("</");
    xml.push_str(name);
    xml.push('>');
}

/// Wrap an already-escaped inner document in the SOAP 1.1 `checkIn` envelope.
pub fn wrap(escaped_inner: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\n\
         \x20 <soap:Body>\n\
         \x20   <checkIn xmlns=\"http://tigergenericinterface.org/\">\n\
         \x20     <XMLString>{}</XMLString>\n\
         \x20   </checkIn>\n\
         \x20 </soap:Body>\n\
         </soap:Envelope>",
        escaped_inner
    )
}

pub fn build_check_in_envelope(inner_xml: &str) -> String {
    wrap(&escape(inner_xml))
}
