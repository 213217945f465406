//! Typed LINE message payloads and the rendering from [`Reply`] values.
//! Field names follow the Messaging API JSON; serialization is the only
//! consumer, so the structs stay write-only.

use serde::Serialize;

use meshitomo_core::{RecommendedShop, Reply};

const SHOPS_ALT_TEXT: &str = "おすすめのお店をご紹介します！";
const ANOTHER_PROMPT: &str = "気に入らない場合は、他の候補も見てみますか？";
const ANOTHER_LABEL: &str = "違う店が見たい";
const ANOTHER_TEXT: &str = "違う店";
const DETAIL_LABEL: &str = "詳細を見る";

/// A buttons template carries at most four actions.
const MAX_TEMPLATE_ACTIONS: usize = 4;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum MessagePayload {
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(rename = "quickReply", skip_serializing_if = "Option::is_none")]
        quick_reply: Option<QuickReply>,
    },
    #[serde(rename = "flex")]
    Flex {
        #[serde(rename = "altText")]
        alt_text: String,
        contents: FlexContainer,
    },
    #[serde(rename = "template")]
    Template {
        #[serde(rename = "altText")]
        alt_text: String,
        template: ButtonsTemplate,
    },
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into(), quick_reply: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuickReply {
    pub items: Vec<QuickReplyItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuickReplyItem {
    #[serde(rename = "type")]
    kind: &'static str,
    pub action: MessageAction,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageAction {
    #[serde(rename = "type")]
    kind: &'static str,
    pub label: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ButtonsTemplate {
    #[serde(rename = "type")]
    kind: &'static str,
    pub text: String,
    pub actions: Vec<PostbackAction>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PostbackAction {
    #[serde(rename = "type")]
    kind: &'static str,
    pub label: String,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlexContainer {
    Bubble(FlexBubble),
    Carousel(FlexCarousel),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlexCarousel {
    #[serde(rename = "type")]
    kind: &'static str,
    pub contents: Vec<FlexBubble>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlexBubble {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero: Option<FlexImage>,
    pub body: FlexBox,
    pub footer: FlexBox,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlexImage {
    #[serde(rename = "type")]
    kind: &'static str,
    pub url: String,
    pub size: &'static str,
    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: &'static str,
    #[serde(rename = "aspectMode")]
    pub aspect_mode: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlexBox {
    #[serde(rename = "type")]
    kind: &'static str,
    pub layout: &'static str,
    pub spacing: &'static str,
    pub contents: Vec<FlexComponent>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlexComponent {
    Text(FlexText),
    Button(FlexButton),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlexText {
    #[serde(rename = "type")]
    kind: &'static str,
    pub text: String,
    pub size: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
    pub wrap: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlexButton {
    #[serde(rename = "type")]
    kind: &'static str,
    pub style: &'static str,
    pub action: UriAction,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UriAction {
    #[serde(rename = "type")]
    kind: &'static str,
    pub label: &'static str,
    pub uri: String,
}

/// Render one reply into the message list sent back to the platform.
pub fn render_reply(reply: &Reply) -> Vec<MessagePayload> {
    match reply {
        Reply::Text(text) => vec![MessagePayload::text(text.clone())],
        Reply::Shops { shops, offer_another } => {
            let mut messages = vec![shops_message(shops)];
            if *offer_another {
                messages.push(MessagePayload::Text {
                    text: ANOTHER_PROMPT.to_string(),
                    quick_reply: Some(QuickReply {
                        items: vec![QuickReplyItem {
                            kind: "action",
                            action: MessageAction {
                                kind: "message",
                                label: ANOTHER_LABEL.to_string(),
                                text: ANOTHER_TEXT.to_string(),
                            },
                        }],
                    }),
                });
            }
            messages
        }
        Reply::PlanMenu { message, offers } => {
            let actions = offers
                .iter()
                .take(MAX_TEMPLATE_ACTIONS)
                .map(|offer| PostbackAction {
                    kind: "postback",
                    label: offer.label.clone(),
                    data: format!("plan:{}", offer.id.0),
                })
                .collect();
            vec![MessagePayload::Template {
                alt_text: message.clone(),
                template: ButtonsTemplate { kind: "buttons", text: message.clone(), actions },
            }]
        }
        Reply::Link { message, url } => {
            vec![MessagePayload::text(format!("{message}\n{url}"))]
        }
    }
}

fn shops_message(shops: &[RecommendedShop]) -> MessagePayload {
    let bubbles: Vec<FlexBubble> = shops.iter().map(shop_bubble).collect();
    let contents = match <[FlexBubble; 1]>::try_from(bubbles) {
        Ok([single]) => FlexContainer::Bubble(single),
        Err(bubbles) => FlexContainer::Carousel(FlexCarousel { kind: "carousel", contents: bubbles }),
    };
    MessagePayload::Flex { alt_text: SHOPS_ALT_TEXT.to_string(), contents }
}

fn shop_bubble(shop: &RecommendedShop) -> FlexBubble {
    let mut contents = vec![FlexComponent::Text(FlexText {
        kind: "text",
        text: shop.name.clone(),
        size: "md",
        weight: Some("bold"),
        color: None,
        wrap: true,
    })];

    if !shop.tags.is_empty() {
        contents.push(small_text(shop.tags.clone(), Some("#555555")));
    }

    contents.push(small_text("📖 【紹介文】".to_string(), None));
    for line in shop.intro.lines().take(3) {
        contents.push(small_text(line.trim().to_string(), None));
    }

    contents.push(small_text("🍴 【おすすめの一品】".to_string(), None));
    for line in shop.highlight.lines().take(2) {
        contents.push(small_text(line.trim().to_string(), None));
    }

    contents.push(small_text(format!("💴 {}", shop.price_band), Some("#ff6600")));
    contents.push(small_text(format!("🚬 {}", shop.smoking), Some("#888888")));
    contents.push(small_text(format!("📍 {}", shop.address), Some("#888888")));

    FlexBubble {
        kind: "bubble",
        hero: shop.photo_url.clone().map(|url| FlexImage {
            kind: "image",
            url,
            size: "full",
            aspect_ratio: "4:3",
            aspect_mode: "cover",
        }),
        body: FlexBox { kind: "box", layout: "vertical", spacing: "xs", contents },
        footer: FlexBox {
            kind: "box",
            layout: "vertical",
            spacing: "sm",
            contents: vec![FlexComponent::Button(FlexButton {
                kind: "button",
                style: "primary",
                action: UriAction { kind: "uri", label: DETAIL_LABEL, uri: shop.detail_url.clone() },
            })],
        },
    }
}

fn small_text(text: String, color: Option<&'static str>) -> FlexComponent {
    FlexComponent::Text(FlexText { kind: "text", text, size: "sm", weight: None, color, wrap: true })
}

#[cfg(test)]
mod tests {
    use meshitomo_core::plans::PlanId;
    use meshitomo_core::{PlanOffer, RecommendedShop, Reply};

    use super::{render_reply, MessagePayload};

    fn shop(name: &str) -> RecommendedShop {
        RecommendedShop {
            name: name.to_string(),
            tags: "#焼肉 #渋谷".to_string(),
            intro: "《とら》\n炭火の香りが自慢です🔥".to_string(),
            highlight: "《特選カルビ》\nとろける一品".to_string(),
            price_band: "3001〜4000円".to_string(),
            smoking: "禁煙".to_string(),
            address: "東京都渋谷区道玄坂1-2-3".to_string(),
            detail_url: "https://example.com/shop/1".to_string(),
            photo_url: Some("https://img.example.com/1.jpg".to_string()),
        }
    }

    fn to_json(payload: &MessagePayload) -> serde_json::Value {
        serde_json::to_value(payload).expect("serialize payload")
    }

    #[test]
    fn single_shop_renders_one_bubble_card() {
        let messages =
            render_reply(&Reply::Shops { shops: vec![shop("とら")], offer_another: false });
        assert_eq!(messages.len(), 1);

        let json = to_json(&messages[0]);
        assert_eq!(json["type"], "flex");
        assert_eq!(json["contents"]["type"], "bubble");
        assert_eq!(json["contents"]["hero"]["url"], "https://img.example.com/1.jpg");
        assert_eq!(json["contents"]["footer"]["contents"][0]["action"]["uri"], "https://example.com/shop/1");
    }

    #[test]
    fn multiple_shops_render_as_carousel() {
        let messages = render_reply(&Reply::Shops {
            shops: vec![shop("とら"), shop("うし")],
            offer_another: false,
        });

        let json = to_json(&messages[0]);
        assert_eq!(json["contents"]["type"], "carousel");
        assert_eq!(json["contents"]["contents"].as_array().expect("bubbles").len(), 2);
        assert_eq!(json["contents"]["contents"][0]["type"], "bubble");
    }

    #[test]
    fn offer_another_adds_quick_reply_message() {
        let messages =
            render_reply(&Reply::Shops { shops: vec![shop("とら")], offer_another: true });
        assert_eq!(messages.len(), 2);

        let json = to_json(&messages[1]);
        assert_eq!(json["type"], "text");
        assert_eq!(json["quickReply"]["items"][0]["action"]["text"], "違う店");
    }

    #[test]
    fn bubble_body_carries_validated_price_and_placeholders() {
        let mut record = shop("とら");
        record.price_band = "情報未定".to_string();
        let messages = render_reply(&Reply::Shops { shops: vec![record], offer_another: false });

        let json = to_json(&messages[0]);
        let body = json["contents"]["body"]["contents"].as_array().expect("body");
        assert!(body.iter().any(|component| component["text"] == "💴 情報未定"));
        assert!(body.iter().any(|component| component["text"] == "🚬 禁煙"));
    }

    #[test]
    fn plan_menu_renders_postback_buttons() {
        let messages = render_reply(&Reply::PlanMenu {
            message: "プランをお選びください".to_string(),
            offers: vec![
                PlanOffer { id: PlanId::new("light"), label: "ライト".to_string() },
                PlanOffer { id: PlanId::new("premium"), label: "プレミアム".to_string() },
            ],
        });

        let json = to_json(&messages[0]);
        assert_eq!(json["type"], "template");
        assert_eq!(json["template"]["type"], "buttons");
        assert_eq!(json["template"]["actions"][0]["data"], "plan:light");
        assert_eq!(json["template"]["actions"][1]["label"], "プレミアム");
    }

    #[test]
    fn link_reply_renders_as_text_with_url() {
        let messages = render_reply(&Reply::Link {
            message: "お手続きはこちら".to_string(),
            url: "https://pay.example.com/portal/cus_1".to_string(),
        });

        let json = to_json(&messages[0]);
        assert_eq!(json["type"], "text");
        let text = json["text"].as_str().expect("text");
        assert!(text.contains("お手続きはこちら"));
        assert!(text.ends_with("https://pay.example.com/portal/cus_1"));
    }

    #[test]
    fn long_intro_is_clamped_to_three_lines() {
        let mut record = shop("とら");
        record.intro = "1行目\n2行目\n3行目\n4行目".to_string();
        let messages = render_reply(&Reply::Shops { shops: vec![record], offer_another: false });

        let json = to_json(&messages[0]);
        let body = json["contents"]["body"]["contents"].as_array().expect("body");
        assert!(body.iter().any(|component| component["text"] == "3行目"));
        assert!(!body.iter().any(|component| component["text"] == "4行目"));
    }
}
