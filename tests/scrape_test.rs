// Page extractor and URL helpers, exercised through the public API.

use sitesmith_backend::scrape::{
    extract_page_data, is_blocked_by_robots, normalize_url, parse_robots_txt, url_to_slug, ScrapedData,
    CanonicalPrefix,
};
use url::Url;

fn extract(html: &str, page: &str) -> sitesmith_backend::scrape::PageData {
    let page_url = Url::parse(page).unwrap();
    let origin = page_url.join("/").unwrap();
    extract_page_data(html, &page_url, &origin)
}

// ═══════════════════════════════════════════════════════════════════════════
//  URLs & robots
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn normalize_strips_trailing_slash_and_rejects_other_origins() {
    assert_eq!(normalize_url("http://x.com/a/", "http://x.com").as_deref(), Some("http://x.com/a"));
    assert_eq!(normalize_url("http://other.com", "http://x.com"), None);
}

#[test]
fn slugs_from_paths() {
    assert_eq!(url_to_slug("http://x.com/services/plumbing.html", "http://x.com"), "services--plumbing");
    assert_eq!(url_to_slug("http://x.com/", "http://x.com"), "index");
}

#[test]
fn robots_prefix_blocking() {
    let rules = vec!["/admin/".to_string()];
    assert!(is_blocked_by_robots("/admin/settings", &rules));
    assert!(!is_blocked_by_robots("/about", &rules));

    let parsed = parse_robots_txt("# staging\nUser-agent: Googlebot\nDisallow: /g/\n\nUser-agent: *\nDisallow: /admin/\n");
    assert_eq!(parsed, rules);
}

// ═══════════════════════════════════════════════════════════════════════════
//  Extractor
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn headings_keep_document_order_and_levels() {
    let page = extract(
        "<h1>First</h1><p>intro</p><h2>Second</h2><h1>Third</h1><h3>   </h3><h4>ignored</h4>",
        "https://acme.test/",
    );
    let got: Vec<(u8, &str)> = page.headings.iter().map(|h| (h.level, h.text.as_str())).collect();
    assert_eq!(got, vec![(1, "First"), (2, "Second"), (1, "Third")]);
}

#[test]
fn malformed_json_ld_is_skipped() {
    let html = r#"<html><head>
        <script type="application/ld+json">{ "@type": "Organization", </script>
        <script type="application/ld+json">{"@type":"LocalBusiness","name":"Acme","address":{"@type":"PostalAddress","streetAddress":"1 Main St","addressLocality":"Springfield","addressRegion":"IL","postalCode":"62701"}}</script>
        </head><body><address>PO Box 9</address></body></html>"#;
    let page = extract(html, "https://acme.test/");
    assert_eq!(page.structured_data.len(), 1);
    assert_eq!(page.address.as_deref(), Some("1 Main St, Springfield, IL 62701"));
}

#[test]
fn address_falls_back_to_address_element() {
    let page = extract("<footer><address>\n  12 Elm Road,\n  Shelbyville\n</address></footer>", "https://acme.test/");
    assert_eq!(page.address.as_deref(), Some("12 Elm Road, Shelbyville"));
}

#[test]
fn extraction_survives_garbage() {
    for html in ["", "<<<>>>", "<html><body><a href=\"http://[::1\">x</a>", "\u{0}\u{feff}<p>"] {
        let page = extract(html, "https://acme.test/x");
        assert_eq!(page.slug, "x");
    }
}

#[test]
fn testimonials_are_windowed_and_deduplicated() {
    let long = "a".repeat(2000);
    let quote = "Acme fixed our burst pipe within the hour. Lifesavers!";
    let html = format!(
        r#"<div class="Testimonial-card">{quote}</div>
           <blockquote>{quote}</blockquote>
           <div class="review">Too short</div>
           <blockquote>{long}</blockquote>
           <div class="customer-reviews"><p>Friendly, tidy and on time every visit.</p></div>"#
    );
    let page = extract(&html, "https://acme.test/reviews");
    assert_eq!(
        page.testimonials,
        vec![quote.to_string(), "Friendly, tidy and on time every visit.".to_string()]
    );
}

#[test]
fn internal_links_are_normalized_and_filtered() {
    let html = r##"
        <a href="/services/">Services</a>
        <a href="/services?utm=x#top">Services again</a>
        <a href="#team">Team</a>
        <a href="tel:5551234567">Call</a>
        <a href="mailto:hi@acme.test">Mail</a>
        <a href="javascript:void(0)">JS</a>
        <a href="/files/menu.pdf">Menu</a>
        <a href="https://facebook.com/acme">Facebook</a>
        <a href="contact">Contact</a>"##;
    let page = extract(html, "https://acme.test/about/");
    assert_eq!(
        page.internal_links,
        vec!["https://acme.test/services".to_string(), "https://acme.test/about/contact".to_string()]
    );
    assert_eq!(page.social_links, vec!["https://facebook.com/acme".to_string()]);
}

#[test]
fn contacts_are_deduplicated() {
    let html = r#"<p>Call (555) 123-4567 or 555-123-4567. Again: (555) 123-4567.</p>
        <p>Mail INFO@acme.test or info@acme.test, not logo@2x.png</p>"#;
    let page = extract(html, "https://acme.test/");
    assert_eq!(page.phones, vec!["(555) 123-4567".to_string(), "555-123-4567".to_string()]);
    assert_eq!(page.emails, vec!["info@acme.test".to_string()]);
}

#[test]
fn forms_and_navigation() {
    let html = r##"
        <header><a href="/">Home</a><a href="#main">Skip</a><a href="/about"> </a></header>
        <nav><a href="/services">Services</a><a href="tel:555">Call</a></nav>
        <form action="/quote" method="post">
            <input name="name" placeholder="Your name">
            <input type="email" name="email">
            <textarea name="details"></textarea>
            <select name="service"><option>Drains</option></select>
        </form>
        <form action="/search"><button>Go</button></form>"##;
    let page = extract(html, "https://acme.test/contact");

    let nav: Vec<(&str, &str)> = page.navigation.iter().map(|n| (n.text.as_str(), n.href.as_str())).collect();
    assert_eq!(nav, vec![("Home", "https://acme.test/"), ("Services", "https://acme.test/services")]);

    assert_eq!(page.forms.len(), 1);
    let form = &page.forms[0];
    assert_eq!(form.action.as_deref(), Some("https://acme.test/quote"));
    assert_eq!(form.method, "POST");
    let types: Vec<&str> = form.fields.iter().map(|f| f.field_type.as_str()).collect();
    assert_eq!(types, vec!["text", "email", "textarea", "select"]);
    assert_eq!(form.fields[0].placeholder.as_deref(), Some("Your name"));
}

#[test]
fn images_resolve_and_name() {
    let html = r#"<img src="/img/team.jpg?v=3" alt=" Our team "><img src="data:image/png;base64,AAAA"><img src="">"#;
    let page = extract(html, "https://acme.test/about/");
    assert_eq!(page.images.len(), 1);
    assert_eq!(page.images[0].src, "https://acme.test/img/team.jpg?v=3");
    assert_eq!(page.images[0].filename, "team.jpg");
    assert_eq!(page.images[0].alt, "Our team");
}

#[test]
fn body_text_skips_short_blocks() {
    let page = extract("<p>Hi there</p><p>We fix leaks across the valley.</p><li>Same-day service</li>", "https://acme.test/");
    assert_eq!(page.body_text, "We fix leaks across the valley.\nSame-day service");
}

// ═══════════════════════════════════════════════════════════════════════════
//  Aggregate
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn aggregate_merges_contacts_across_pages() {
    let mut site = ScrapedData::new("https://www.acme.test", CanonicalPrefix::from_host("www.acme.test"), true);
    site.absorb_page(extract("<p>Call 555-123-4567</p><nav><a href=\"/\">Home</a></nav>", "https://www.acme.test/"));
    site.absorb_page(extract(
        "<p>Call 555-123-4567 or 555-765-4321</p><nav><a href=\"/x\">X</a></nav>",
        "https://www.acme.test/contact",
    ));
    site.skip("https://www.acme.test/admin", "blocked by robots.txt");

    assert_eq!(site.canonical_prefix, CanonicalPrefix::Www);
    assert_eq!(site.global.phones, vec!["555-123-4567".to_string(), "555-765-4321".to_string()]);
    assert_eq!(site.global.navigation.len(), 1);
    assert_eq!(site.global.navigation[0].text, "Home");
    assert_eq!(site.pages.len(), 2);
    assert_eq!(site.skipped.len(), 1);
}
