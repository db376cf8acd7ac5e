//! Channel request shapes
//!
//! These are what gets serialized into `Message::content` and handed to the
//! channel senders as-is.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Recipient identity shared by every channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub external_references: HashMap<String, String>,
}

impl Party {
    pub fn with_id(party_id: impl Into<String>) -> Self {
        Self {
            party_id: Some(party_id.into()),
            external_references: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    /// Base64 encoded
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsRequest {
    #[serde(default)]
    pub party: Party,
    pub sender: String,
    pub mobile_number: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSender {
    pub name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[serde(default)]
    pub party: Party,
    pub email_address: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_message: Option<String>,
    pub sender: EmailSender,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebMessageRequest {
    #[serde(default)]
    pub party: Party,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oep_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalMailRequest {
    #[serde(default)]
    pub party: Party,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnailMailRequest {
    #[serde(default)]
    pub party: Party,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Which letter delivery path an attachment may travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMode {
    DigitalMail,
    SnailMail,
    /// Eligible for both digital mail and printing
    Any,
}

impl DeliveryMode {
    pub fn allows_digital(&self) -> bool {
        matches!(self, DeliveryMode::DigitalMail | DeliveryMode::Any)
    }

    pub fn allows_snail(&self) -> bool {
        matches!(self, DeliveryMode::SnailMail | DeliveryMode::Any)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterAttachment {
    pub delivery_mode: DeliveryMode,
    #[serde(flatten)]
    pub attachment: Attachment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterRequest {
    #[serde(default)]
    pub party: Party,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation: Option<String>,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<LetterAttachment>,
}

impl LetterRequest {
    /// Digital mail for the DIGITAL_MAIL and ANY attachments, `None` if there are none
    pub fn digital_mail(&self) -> Option<DigitalMailRequest> {
        let attachments = self.attachments_where(DeliveryMode::allows_digital);
        if attachments.is_empty() {
            return None;
        }

        Some(DigitalMailRequest {
            party: self.party.clone(),
            subject: self.subject.clone(),
            department: self.department.clone(),
            content_type: self.content_type.clone(),
            body: self.body.clone(),
            attachments,
        })
    }

    /// Snail mail for the SNAIL_MAIL and ANY attachments, `None` if there are none
    pub fn snail_mail(&self) -> Option<SnailMailRequest> {
        let attachments = self.attachments_where(DeliveryMode::allows_snail);
        if attachments.is_empty() {
            return None;
        }

        Some(SnailMailRequest {
            party: self.party.clone(),
            department: self.department.clone(),
            deviation: self.deviation.clone(),
            attachments,
        })
    }

    fn attachments_where(&self, eligible: fn(&DeliveryMode) -> bool) -> Vec<Attachment> {
        self.attachments
            .iter()
            .filter(|a| eligible(&a.delivery_mode))
            .map(|a| a.attachment.clone())
            .collect()
    }
}

/// A message whose channel is picked from the recipient's feedback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericMessageRequest {
    #[serde(default)]
    pub party: Party,
    pub email_sender: EmailSender,
    pub sms_sender: String,
    pub subject: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_message: Option<String>,
}

impl GenericMessageRequest {
    pub fn to_email(&self, email_address: impl Into<String>) -> EmailRequest {
        EmailRequest {
            party: self.party.clone(),
            email_address: email_address.into(),
            subject: self.subject.clone(),
            message: Some(self.message.clone()),
            html_message: self.html_message.clone(),
            sender: self.email_sender.clone(),
            attachments: Vec::new(),
            headers: HashMap::new(),
        }
    }

    pub fn to_sms(&self, mobile_number: impl Into<String>) -> SmsRequest {
        SmsRequest {
            party: self.party.clone(),
            sender: self.sms_sender.clone(),
            mobile_number: mobile_number.into(),
            message: self.message.clone(),
            priority: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str, mode: DeliveryMode) -> LetterAttachment {
        LetterAttachment {
            delivery_mode: mode,
            attachment: Attachment {
                name: name.to_string(),
                content_type: "application/pdf".to_string(),
                content: "aGVsbG8=".to_string(),
            },
        }
    }

    fn letter(attachments: Vec<LetterAttachment>) -> LetterRequest {
        LetterRequest {
            party: Party::with_id("party-1"),
            subject: Some("Beslut".to_string()),
            department: Some("SBK".to_string()),
            deviation: None,
            content_type: "text/plain".to_string(),
            body: Some("body".to_string()),
            attachments,
        }
    }

    #[test]
    fn test_letter_partitions_attachments_by_mode() {
        let request = letter(vec![
            attachment("digital.pdf", DeliveryMode::DigitalMail),
            attachment("snail.pdf", DeliveryMode::SnailMail),
            attachment("any.pdf", DeliveryMode::Any),
        ]);

        let digital = request.digital_mail().unwrap();
        let names: Vec<_> = digital.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["digital.pdf", "any.pdf"]);

        let snail = request.snail_mail().unwrap();
        let names: Vec<_> = snail.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["snail.pdf", "any.pdf"]);
    }

    #[test]
    fn test_letter_without_snail_attachments_has_no_fallback() {
        let request = letter(vec![attachment("digital.pdf", DeliveryMode::DigitalMail)]);
        assert!(request.digital_mail().is_some());
        assert!(request.snail_mail().is_none());
    }

    #[test]
    fn test_letter_attachment_wire_shape() {
        let json = serde_json::to_value(attachment("a.pdf", DeliveryMode::SnailMail)).unwrap();
        assert_eq!(json["deliveryMode"], "SNAIL_MAIL");
        assert_eq!(json["name"], "a.pdf");
        assert_eq!(json["contentType"], "application/pdf");
    }

    #[test]
    fn test_generic_message_to_concrete_channels() {
        let generic = GenericMessageRequest {
            party: Party::with_id("party-1"),
            email_sender: EmailSender {
                name: "Kommunen".to_string(),
                address: "noreply@example.se".to_string(),
                reply_to: None,
            },
            sms_sender: "Kommunen".to_string(),
            subject: "Hej".to_string(),
            message: "Ditt ärende".to_string(),
            html_message: None,
        };

        let email = generic.to_email("someone@example.se");
        assert_eq!(email.email_address, "someone@example.se");
        assert_eq!(email.message.as_deref(), Some("Ditt ärende"));

        let sms = generic.to_sms("+46701234567");
        assert_eq!(sms.mobile_number, "+46701234567");
        assert_eq!(sms.sender, "Kommunen");
    }
}
