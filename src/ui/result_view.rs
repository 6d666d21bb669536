use super::{
    AnyElement, AppView, Button, ButtonVariants, CARD_WIDTH, Context, IntoElement, ParentElement,
    SharedString, Styled, StyledExt, div, px, v_flex,
};
use crate::recycling;

impl AppView {
    pub(super) fn render_result(&self, material: &str, cx: &mut Context<'_, Self>) -> AnyElement {
        let guidance = recycling::guidance_for(material);

        v_flex()
            .w(px(CARD_WIDTH))
            .p_6()
            .gap_4()
            .rounded_xl()
            .bg(gpui::rgba(0xffffff1a))
            .border_1()
            .border_color(gpui::rgba(0xffffff33))
            .child(
                div()
                    .w_full()
                    .flex()
                    .justify_center()
                    .text_size(px(30.0))
                    .font_semibold()
                    .child("¡Material Confirmado!"),
            )
            .child(
                div()
                    .w_full()
                    .flex()
                    .justify_center()
                    .text_size(px(44.0))
                    .font_semibold()
                    .text_color(gpui::rgb(0x93c5fd))
                    .child(material.to_string()),
            )
            .child(
                v_flex()
                    .gap_2()
                    .p_4()
                    .rounded_lg()
                    .bg(gpui::rgb(0x111827))
                    .border_1()
                    .border_color(gpui::rgb(0x374151))
                    .child(div().text_lg().font_semibold().child("Cómo reciclar:"))
                    .child(div().text_color(gpui::rgb(0xd1d5db)).child(guidance)),
            )
            .child(
                Button::new(SharedString::from("scan-again"))
                    .primary()
                    .w_full()
                    .label("Escanear Otro Material")
                    .on_click(cx.listener(|this, _, window, cx| {
                        this.reset(window, cx);
                        cx.notify();
                    })),
            )
            .into_any_element()
    }
}
