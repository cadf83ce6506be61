//! HTML and plain-text renderings of an enquiry, as mailed to the admissions office.

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use shared::domain::{FormField, ParentAttribute, ParentRole, ReferenceId};

use crate::form::EnquiryForm;

pub const SCHOOL_NAME: &str = "Minervaa Vidhya Mandhir School";
const SCHOOL_ADDRESS: &str = "A21, A22 D Colony, Pollachi, Tamil Nadu";
const SCHOOL_PHONES: &str = "+91 98948 86733 | +91 99949 59484";
const SCHOOL_EMAIL: &str = "admissions@minervaa.edu.in";
const NOT_AVAILABLE: &str = "N/A";
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

const STYLE: &str = r#"
body { margin: 0; padding: 20px; font-family: Arial, sans-serif; background: #f3f4f6; }
.container { max-width: 900px; margin: 0 auto; background: white; border-radius: 16px; overflow: hidden; box-shadow: 0 20px 40px rgba(0,0,0,0.1); }
.header { background: #1e40af; color: white; padding: 30px; text-align: center; }
.school-name { font-size: 28px; font-weight: bold; margin: 0; }
.badge { background: #fbbf24; color: #1e3c72; padding: 6px 16px; border-radius: 20px; display: inline-block; font-weight: bold; margin-top: 10px; }
.content { padding: 30px; }
.info-card { background: #f8fafc; border-radius: 12px; padding: 20px; margin-bottom: 20px; border: 1px solid #e2e8f0; }
.card-title { color: #1e40af; font-size: 18px; margin: 0 0 15px 0; padding-bottom: 8px; border-bottom: 2px solid #2563eb; font-weight: bold; }
.info-grid { display: grid; grid-template-columns: repeat(2, 1fr); gap: 15px; }
.info-item { background: white; padding: 12px; border-radius: 8px; border: 1px solid #e2e8f0; }
.info-label { color: #64748b; font-size: 12px; margin-bottom: 4px; }
.info-value { color: #0f172a; font-weight: 600; font-size: 14px; }
.data-table { width: 100%; border-collapse: collapse; }
.data-table th { background: #2563eb; color: white; padding: 10px; text-align: left; font-size: 14px; }
.data-table td { padding: 10px; border: 1px solid #e2e8f0; font-size: 13px; }
.data-table tr:nth-child(even) { background: #f8fafc; }
.tag { display: inline-block; padding: 4px 8px; border-radius: 12px; font-weight: 600; font-size: 12px; }
.tag-blue { background: #dbeafe; color: #1e40af; }
.tag-pink { background: #fce7f3; color: #9d174d; }
.tag-green { background: #dcfce7; color: #166534; }
.tag-red { background: #fee2e2; color: #991b1b; }
.footer { background: #1e293b; color: white; padding: 20px; text-align: center; font-size: 13px; }
.footer-info { margin: 10px 0; color: #cbd5e1; }
.reference-id { background: #fbbf24; color: #1e293b; padding: 4px 12px; border-radius: 4px; display: inline-block; font-weight: bold; margin-bottom: 15px; font-size: 13px; }
@media (max-width: 768px) { .info-grid { grid-template-columns: 1fr; } .school-name { font-size: 22px; } }
"#;

/// `YYYY-MM-DD` as `DD/MM/YYYY`. Unparseable input is shown as entered.
pub fn format_date_en_in(raw: &str) -> String {
    if raw.is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

pub fn format_currency(raw: &str) -> String {
    if raw.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        format!("Rs. {raw}")
    }
}

/// en-IN date and time in Indian Standard Time, e.g. `18/10/2026, 3:04:05 pm`.
pub fn format_submitted_on(at: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(IST_OFFSET_SECS) {
        Some(ist) => at
            .with_timezone(&ist)
            .format("%d/%m/%Y, %-I:%M:%S %P")
            .to_string(),
        None => at.format("%d/%m/%Y, %-I:%M:%S %P").to_string(),
    }
}

/// Drops non-ASCII characters (emoji included) and trims; empty becomes `N/A`.
pub fn sanitize_text(text: &str) -> String {
    let ascii: String = text.chars().filter(char::is_ascii).collect();
    let trimmed = ascii.trim();
    if trimmed.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn email_subject(form: &EnquiryForm) -> String {
    let child = form.get(FormField::ChildName);
    let child = if child.is_empty() { "New Student" } else { child };
    format!("New Admission Enquiry - {child}")
}

pub fn render_text_summary(form: &EnquiryForm) -> String {
    format!(
        "NEW ADMISSION ENQUIRY\n\nStudent: {}\nClass: {}\nContact: {}\n",
        sanitize_text(form.get(FormField::ChildName)),
        sanitize_text(form.get(FormField::ClassAdmission)),
        sanitize_text(form.get(FormField::ContactNumber)),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn or_na(value: &str) -> String {
    if value.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        escape_html(value)
    }
}

/// One enquiry as it was sent: form values, photo preview, reference and time.
#[derive(Debug, Clone, Copy)]
pub struct EmailReport<'a> {
    pub form: &'a EnquiryForm,
    pub photo_preview: Option<&'a str>,
    pub reference_id: &'a ReferenceId,
    pub submitted_at: DateTime<Utc>,
}

impl EmailReport<'_> {
    pub fn subject(&self) -> String {
        email_subject(self.form)
    }

    pub fn render_html(&self) -> String {
        let mut html = String::with_capacity(8 * 1024);

        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
        html.push_str(
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
        );
        let _ = writeln!(html, "<title>New Admission Enquiry - {SCHOOL_NAME}</title>");
        let _ = writeln!(html, "<style>{STYLE}</style>\n</head>\n<body>");
        html.push_str("<div class=\"container\">\n<div class=\"header\">\n");
        let _ = writeln!(
            html,
            "<h1 class=\"school-name\">{}</h1>",
            SCHOOL_NAME.to_uppercase()
        );
        html.push_str("<p style=\"margin: 5px 0 0; opacity: 0.9;\">Excellence in Education</p>\n");
        html.push_str("<div class=\"badge\">ADMISSION ENQUIRY FORM</div>\n</div>\n");

        html.push_str("<div class=\"content\">\n<div style=\"text-align: center; margin-bottom: 20px;\">\n");
        let _ = writeln!(
            html,
            "<span class=\"reference-id\">REF: {}</span>",
            escape_html(self.reference_id.as_str())
        );
        let _ = writeln!(
            html,
            "<p style=\"color: #64748b; font-size: 13px; margin: 5px 0 0;\">Submitted on: {}</p>\n</div>",
            format_submitted_on(self.submitted_at)
        );

        if let Some(preview) = self.photo_preview {
            html.push_str("<div style=\"text-align: center; margin-bottom: 30px;\">\n");
            html.push_str("<div style=\"display: inline-block; border: 4px solid #2563eb; border-radius: 50%; padding: 5px; background: white;\">\n");
            let _ = writeln!(
                html,
                "<img src=\"{}\" alt=\"Student Photo\" style=\"width: 150px; height: 150px; border-radius: 50%; object-fit: cover; display: block;\" />",
                escape_html(preview)
            );
            html.push_str("</div>\n<p style=\"color: #2563eb; font-weight: 600; margin-top: 10px;\">Student Photograph</p>\n</div>\n");
        }

        self.render_child_card(&mut html);
        self.render_parents_card(&mut html);
        self.render_academic_card(&mut html);
        html.push_str("</div>\n");

        html.push_str("<div class=\"footer\">\n");
        let _ = writeln!(
            html,
            "<h3 style=\"color: #fbbf24; margin: 0 0 10px 0;\">{SCHOOL_NAME}</h3>"
        );
        let _ = writeln!(
            html,
            "<div class=\"footer-info\">{SCHOOL_ADDRESS}<br>{SCHOOL_PHONES}<br>{SCHOOL_EMAIL}</div>"
        );
        html.push_str("<div style=\"color: #64748b; font-size: 11px; margin-top: 15px; border-top: 1px solid #334155; padding-top: 10px;\">This is a computer-generated document. No signature is required.</div>\n");
        html.push_str("</div>\n</div>\n</body>\n</html>\n");
        html
    }

    fn render_child_card(&self, html: &mut String) {
        let form = self.form;
        let sex = form.get(FormField::Sex);
        let sex_tag = if sex == "MALE" { "tag-blue" } else { "tag-pink" };

        html.push_str("<div class=\"info-card\">\n<h2 class=\"card-title\">CHILD INFORMATION</h2>\n<div class=\"info-grid\">\n");
        info_item(html, "Full Name", &or_na(form.get(FormField::ChildName)));
        info_item(
            html,
            "Date of Birth",
            &escape_html(&format_date_en_in(form.get(FormField::DateOfBirth))),
        );
        info_item(html, "Sex", &tag(sex_tag, &or_na(sex)));
        info_item(
            html,
            "Blood Group",
            &tag("tag-red", &or_na(form.get(FormField::BloodGroup))),
        );
        info_item(html, "Contact Number", &or_na(form.get(FormField::ContactNumber)));
        info_item(html, "Contact Type", &or_na(form.get(FormField::ContactType)));
        html.push_str("</div>\n</div>\n");
    }

    fn render_parents_card(&self, html: &mut String) {
        html.push_str("<div class=\"info-card\">\n<h2 class=\"card-title\">PARENTS / GUARDIAN DETAILS</h2>\n");
        html.push_str("<table class=\"data-table\">\n<thead>\n<tr><th>Field</th>");
        for role in ParentRole::ALL {
            let _ = write!(html, "<th>{}</th>", role.label());
        }
        html.push_str("</tr>\n</thead>\n<tbody>\n");

        for attribute in ParentAttribute::ALL {
            let _ = write!(html, "<tr><td><strong>{}</strong></td>", attribute.label());
            for role in ParentRole::ALL {
                let raw = self.form.get(role.field(attribute));
                let cell = if attribute == ParentAttribute::Income {
                    escape_html(&format_currency(raw))
                } else {
                    or_na(raw)
                };
                let _ = write!(html, "<td>{cell}</td>");
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</tbody>\n</table>\n</div>\n");
    }

    fn render_academic_card(&self, html: &mut String) {
        let form = self.form;
        let tc = form.get(FormField::TcAttached);
        let tc_tag = if tc == "YES" { "tag-green" } else { "tag-red" };

        html.push_str("<div class=\"info-card\">\n<h2 class=\"card-title\">ACADEMIC INFORMATION</h2>\n<div class=\"info-grid\">\n");
        info_item(
            html,
            "Class Seeking Admission",
            &tag("tag-green", &or_na(form.get(FormField::ClassAdmission))),
        );
        info_item(html, "Transfer Certificate", &tag(tc_tag, &or_na(tc)));
        html.push_str("</div>\n<div style=\"margin-top: 15px;\">\n");
        html.push_str("<div class=\"info-label\">How did you know about MVM School?</div>\n");
        let _ = writeln!(
            html,
            "<div style=\"background: white; padding: 12px; border-radius: 8px; border: 1px solid #e2e8f0; margin-top: 8px; font-size: 13px;\">{}</div>",
            or_na(form.get(FormField::HowKnow))
        );
        html.push_str("</div>\n</div>\n");
    }
}

fn info_item(html: &mut String, label: &str, value_html: &str) {
    let _ = writeln!(
        html,
        "<div class=\"info-item\"><div class=\"info-label\">{label}</div><div class=\"info-value\">{value_html}</div></div>"
    );
}

fn tag(class: &str, value_html: &str) -> String {
    format!("<span class=\"tag {class}\">{value_html}</span>")
}

#[cfg(test)]
#[path = "tests/report_tests.rs"]
mod tests;
