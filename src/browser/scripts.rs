//! Page scripts evaluated by the Chromium backend
//!
//! Every script is an expression that returns a JSON string, so results come
//! back through `returnByValue` the same way whether they are lists, status
//! objects or nothing at all.

use crate::browser::{AriaRole, ElementQuery, ElementRef};

/// Attribute stamped on elements handed out as [`ElementRef`]s
pub const REF_ATTR: &str = "data-qa-pilot-ref";

/// Interactive selector set shared by the inventory
pub const INTERACTIVE_SELECTOR: &str =
    r#"button, a, input, select, textarea, [role="button"], [role="link"]"#;

/// Elements whose text is never rendered content
pub const NON_CONTENT_SELECTOR: &str = "script, style, template, noscript";

/// Helpers prepended to every script
const PRELUDE: &str = r#"
const __norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const __label = (el) => {
  const aria = el.getAttribute('aria-label');
  if (aria && aria.trim()) return __norm(aria);
  const ids = (el.getAttribute('aria-labelledby') || '').split(/\s+/).filter(Boolean);
  const byIds = ids.map((id) => { const n = document.getElementById(id); return n ? n.textContent : ''; }).join(' ');
  if (__norm(byIds)) return __norm(byIds);
  if (el.labels && el.labels.length) return __norm(Array.from(el.labels).map((l) => l.textContent).join(' '));
  return '';
};
const __name = (el) => __label(el) || __norm(el.innerText || el.textContent) || __norm(el.value) || __norm(el.getAttribute('title'));
const __byRef = (ref) => document.querySelector('[REF_ATTR="' + ref + '"]');
"#;

fn wrap(body: &str) -> String {
    format!(
        "(() => {{{}\n{}\n}})()",
        PRELUDE.replace("REF_ATTR", REF_ATTR),
        body
    )
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// CSS selector for an element handed out by a query
pub fn ref_selector(element: &ElementRef) -> String {
    format!(r#"[{}="{}"]"#, REF_ATTR, element.as_str())
}

/// Inventory of every interactive element with the computed style needed
/// for the visibility filter. Read-only.
pub fn inventory() -> String {
    let body = format!(
        r#"
const out = [];
for (const el of document.querySelectorAll({selector})) {{
  const style = window.getComputedStyle(el);
  const tag = el.tagName.toLowerCase();
  const hasValue = (tag === 'input' || tag === 'textarea' || tag === 'select');
  out.push({{
    tag,
    id: el.id || null,
    name: el.getAttribute('name'),
    inputType: el.getAttribute('type'),
    text: el.innerText || el.textContent || null,
    placeholder: el.getAttribute('placeholder'),
    label: __label(el) || null,
    value: hasValue ? String(el.value) : null,
    display: style.display,
    visibility: style.visibility,
    opacity: style.opacity,
    rendered: el.getClientRects().length > 0,
  }});
}}
return JSON.stringify(out);"#,
        selector = js_string(INTERACTIVE_SELECTOR)
    );
    wrap(&body)
}

/// Run one lookup and stamp every match with a ref attribute.
/// Returns the refs in document order.
pub fn query(query: &ElementQuery) -> String {
    let (kind, needle) = match query {
        ElementQuery::Id(v) => ("id", v),
        ElementQuery::Name(v) => ("name", v),
        ElementQuery::Placeholder(v) => ("placeholder", v),
        ElementQuery::Label(v) => ("label", v),
        ElementQuery::Role {
            role: AriaRole::Button,
            name,
        } => ("button", name),
        ElementQuery::Role {
            role: AriaRole::Link,
            name,
        } => ("link", name),
        ElementQuery::Text(v) => ("text", v),
    };

    let body = format!(
        r#"
const kind = {kind};
const needle = {needle};
const lower = needle.toLowerCase();
const has = (s) => __norm(s).toLowerCase().includes(lower);
const skip = {skip};
const all = (sel) => Array.from(document.querySelectorAll(sel));
const content = (sel) => all(sel).filter((el) => !el.closest(skip));
let found = [];
switch (kind) {{
  case 'id': found = all('[id]').filter((el) => el.id === needle); break;
  case 'name': found = all('[name]').filter((el) => el.getAttribute('name') === needle); break;
  case 'placeholder': found = all('[placeholder]').filter((el) => has(el.getAttribute('placeholder'))); break;
  case 'label': found = content('body *').filter((el) => {{ const l = __label(el); return l && has(l); }}); break;
  case 'button': found = all('button, input[type="button"], input[type="submit"], input[type="reset"], [role="button"]').filter((el) => has(__name(el))); break;
  case 'link': found = all('a[href], [role="link"]').filter((el) => has(__name(el))); break;
  case 'text': found = content('body *').filter((el) => {{
    if (!has(el.innerText)) return false;
    return !Array.from(el.children).some((c) => !c.matches(skip) && has(c.innerText));
  }}); break;
}}
const root = document.documentElement;
let seq = Number(root.getAttribute('{attr}-seq') || '0');
const refs = found.map((el) => {{
  let ref = el.getAttribute('{attr}');
  if (!ref) {{ seq += 1; ref = String(seq); el.setAttribute('{attr}', ref); }}
  return ref;
}});
root.setAttribute('{attr}-seq', String(seq));
return JSON.stringify(refs);"#,
        kind = js_string(kind),
        needle = js_string(needle),
        skip = js_string(NON_CONTENT_SELECTOR),
        attr = REF_ATTR,
    );
    wrap(&body)
}

/// Scroll the element into view and report why a real click would not land
pub fn actionability(element: &ElementRef) -> String {
    let body = format!(
        r#"
const el = __byRef({r});
if (!el) return JSON.stringify({{ ok: false, reason: 'element detached' }});
el.scrollIntoView({{ block: 'center', inline: 'center' }});
const style = window.getComputedStyle(el);
if (style.visibility === 'hidden' || style.display === 'none') return JSON.stringify({{ ok: false, reason: 'element is hidden' }});
if (el.disabled) return JSON.stringify({{ ok: false, reason: 'element is disabled' }});
const rect = el.getBoundingClientRect();
if (rect.width === 0 || rect.height === 0) return JSON.stringify({{ ok: false, reason: 'element has no size' }});
const hit = document.elementFromPoint(rect.left + rect.width / 2, rect.top + rect.height / 2);
if (hit && hit !== el && !el.contains(hit)) {{
  const desc = hit.tagName.toLowerCase() + (hit.id ? '#' + hit.id : '');
  return JSON.stringify({{ ok: false, reason: 'element is covered by ' + desc }});
}}
return JSON.stringify({{ ok: true }});"#,
        r = js_string(element.as_str())
    );
    wrap(&body)
}

/// Empty an editable element so typed input replaces its value
pub fn clear_value(element: &ElementRef) -> String {
    let body = format!(
        r#"
const el = __byRef({r});
if (!el) return JSON.stringify({{ ok: false, reason: 'element detached' }});
if (el.isContentEditable) {{ el.textContent = ''; return JSON.stringify({{ ok: true }}); }}
if (!('value' in el)) return JSON.stringify({{ ok: false, reason: 'element is not editable' }});
if (el.readOnly) return JSON.stringify({{ ok: false, reason: 'element is read-only' }});
el.value = '';
return JSON.stringify({{ ok: true }});"#,
        r = js_string(element.as_str())
    );
    wrap(&body)
}

/// `HTMLElement.click()` from script
pub fn script_click(element: &ElementRef) -> String {
    let body = format!(
        r#"
const el = __byRef({r});
if (!el) return JSON.stringify({{ ok: false, reason: 'element detached' }});
el.click();
return JSON.stringify({{ ok: true }});"#,
        r = js_string(element.as_str())
    );
    wrap(&body)
}

/// Assign the value through the native setter and fire input/change
pub fn script_fill(element: &ElementRef, value: &str) -> String {
    let body = format!(
        r#"
const el = __byRef({r});
const value = {v};
if (!el) return JSON.stringify({{ ok: false, reason: 'element detached' }});
if (el.isContentEditable) {{
  el.textContent = value;
}} else {{
  const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
    : el instanceof HTMLSelectElement ? HTMLSelectElement.prototype
    : el instanceof HTMLInputElement ? HTMLInputElement.prototype
    : null;
  if (!proto) return JSON.stringify({{ ok: false, reason: 'element is not editable' }});
  const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
  setter.call(el, value);
}}
el.dispatchEvent(new Event('input', {{ bubbles: true }}));
el.dispatchEvent(new Event('change', {{ bubbles: true }}));
return JSON.stringify({{ ok: true }});"#,
        r = js_string(element.as_str()),
        v = js_string(value)
    );
    wrap(&body)
}

/// Fire a bubbling `input` event
pub fn dispatch_input(element: &ElementRef) -> String {
    let body = format!(
        r#"
const el = __byRef({r});
if (!el) return JSON.stringify({{ ok: false, reason: 'element detached' }});
el.dispatchEvent(new Event('input', {{ bubbles: true }}));
return JSON.stringify({{ ok: true }});"#,
        r = js_string(element.as_str())
    );
    wrap(&body)
}
