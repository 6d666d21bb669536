use super::{
    AnyElement, AppView, CARD_INNER_WIDTH, CARD_WIDTH, Context, IntoElement, ObjectFit,
    ParentElement, SessionLifecycle, Styled, StyledExt, StyledImage, VIDEO_HEIGHT, Window, div,
    img, px, v_flex,
};

impl AppView {
    pub(super) fn render_scan(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        self.drain_preview(window, cx);

        let initializing = *self.session.lifecycle() == SessionLifecycle::Initializing;
        let error_copy = self.session.error().map(|error| error.user_message());

        let frame_view: AnyElement = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Cover)
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Esperando cámara...")
                .into_any_element()
        };

        let mut viewfinder = div()
            .relative()
            .w_full()
            .h(px(VIDEO_HEIGHT))
            .overflow_hidden()
            .rounded_xl()
            .bg(gpui::rgb(0x030712))
            .border_1()
            .border_color(gpui::rgba(0xffffff1a))
            .child(frame_view);

        if initializing || error_copy.is_some() {
            viewfinder = viewfinder.child(self.render_scan_overlay(initializing, error_copy));
        }

        let (label, confidence) = match self.session.latest_prediction() {
            Some(prediction) => (prediction.label.clone(), prediction.confidence),
            None => ("Identificando...".to_string(), 0.0),
        };

        let frame_status = self
            .latest_frame
            .as_ref()
            .map(|frame| format!("Cámara: {}x{}", frame.width, frame.height))
            .unwrap_or_else(|| "Cámara: esperando señal...".to_string());

        v_flex()
            .w(px(CARD_WIDTH))
            .p_6()
            .gap_4()
            .rounded_xl()
            .bg(gpui::rgba(0xffffff1a))
            .border_1()
            .border_color(gpui::rgba(0xffffff33))
            .child(
                v_flex()
                    .items_center()
                    .gap_1()
                    .child(
                        div()
                            .text_size(px(30.0))
                            .font_semibold()
                            .child("Identificador de Materiales"),
                    )
                    .child(
                        div()
                            .text_sm()
                            .text_color(gpui::rgb(0xd1d5db))
                            .child("Apunta tu cámara a un objeto por 5 segundos."),
                    ),
            )
            .child(viewfinder)
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0x8b95a5))
                    .child(frame_status),
            )
            .child(self.render_prediction_block(label, confidence))
            .into_any_element()
    }

    fn render_scan_overlay(
        &self,
        initializing: bool,
        error_copy: Option<&'static str>,
    ) -> AnyElement {
        let message: AnyElement = if initializing {
            let loading_text = match self
                .session
                .download_progress()
                .and_then(|progress| progress.percent())
            {
                Some(percent) => format!("Cargando Modelo... {percent:.0}%"),
                None => "Cargando Modelo...".to_string(),
            };
            div()
                .text_lg()
                .font_semibold()
                .child(loading_text)
                .into_any_element()
        } else {
            v_flex()
                .items_center()
                .gap_1()
                .text_color(gpui::rgb(0xfca5a5))
                .child(div().text_lg().font_semibold().child("Error de Cámara"))
                .child(
                    div()
                        .text_sm()
                        .child(error_copy.unwrap_or("Fallo desconocido.")),
                )
                .into_any_element()
        };

        div()
            .absolute()
            .top(px(0.0))
            .left(px(0.0))
            .size_full()
            .flex()
            .items_center()
            .justify_center()
            .p_4()
            .bg(gpui::rgba(0x030712cc))
            .child(message)
            .into_any_element()
    }

    fn render_prediction_block(&self, label: String, confidence: f32) -> AnyElement {
        let bar_width = CARD_INNER_WIDTH * (confidence / 100.0).clamp(0.0, 1.0);

        v_flex()
            .items_center()
            .gap_1()
            .child(
                div()
                    .text_xs()
                    .font_semibold()
                    .text_color(gpui::rgb(0x9ca3af))
                    .child("PREDICCIÓN"),
            )
            .child(div().text_size(px(36.0)).font_semibold().child(label))
            .child(
                div()
                    .text_lg()
                    .text_color(gpui::rgb(0xd1d5db))
                    .child(format!("Confianza: {confidence:.1}%")),
            )
            .child(
                div()
                    .w_full()
                    .h(px(10.0))
                    .mt_2()
                    .rounded_full()
                    .overflow_hidden()
                    .bg(gpui::rgb(0x374151))
                    .child(div().w(px(bar_width)).h_full().bg(gpui::rgb(0x3b82f6))),
            )
            .into_any_element()
    }
}
