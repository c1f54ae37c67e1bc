use crate::scope::Scope;
use polars::prelude::*;

pub const TIME_COLUMN_NAME: &str = "time";

/// Name of the volts column for `channel`, e.g. `ch2`.
pub fn channel_column_name(channel: usize) -> String {
    format!("ch{channel}")
}

impl<T, D> Scope<T, D> {
    /// The last acquisition as a table: a `time` column in seconds and one
    /// `ch<n>` column in volts per channel that was grabbed.
    ///
    /// Before the first acquisition the frame has a single, empty `time`
    /// column.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut columns: Vec<Column> =
            vec![Series::new(TIME_COLUMN_NAME.into(), self.time_axis()).into()];

        for channel in self.grabbed_channels() {
            let name = channel_column_name(channel.index());
            columns.push(Series::new(name.into(), channel.scaled_waveform()).into());
        }

        DataFrame::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_mask::ChannelMask;
    use crate::rigol::Rigol;
    use crate::transport::LoopbackTransport;

    fn trace_reply(byte: u8) -> Vec<u8> {
        let mut reply = b"#800000600".to_vec();
        reply.extend_from_slice(&[byte; 600]);
        reply
    }

    fn rigol() -> Scope<LoopbackTransport, Rigol> {
        let transport = LoopbackTransport::new()
            .respond("*IDN?", "Rigol Technologies,DS1102E,DS1EB0000,00.02.06\n")
            .respond(":WAV:DATA? CHAN1", trace_reply(125))
            .respond(":WAV:DATA? CHAN2", trace_reply(100))
            .respond(":CHAN1:SCAL?", "1.000e+00\n")
            .respond(":CHAN1:OFFS?", "0.000e+00\n")
            .respond(":CHAN2:SCAL?", "1.000e+00\n")
            .respond(":CHAN2:OFFS?", "0.000e+00\n")
            .respond(":TIM:SCAL?", "5.000e-04\n")
            .respond(":TIM:OFFS?", "0.000e+00\n");
        Scope::new(transport, Rigol).unwrap()
    }

    #[test]
    fn test_frame_before_acquisition() {
        let df = rigol().to_dataframe().unwrap();
        assert_eq!(df.width(), 1);
        assert_eq!(df.height(), 0);
    }

    #[test]
    fn test_frame_has_time_and_channel_columns() {
        let mut scope = rigol();
        scope.grab_data().unwrap();
        let df = scope.to_dataframe().unwrap();

        assert_eq!(df.width(), 3);
        assert_eq!(df.height(), 600);

        let time = df.column(TIME_COLUMN_NAME).unwrap().f64().unwrap();
        assert!((time.get(0).unwrap() + 3e-3).abs() < 1e-12);

        let ch1 = df.column("ch1").unwrap().f64().unwrap();
        assert!(ch1.get(0).unwrap().abs() < 1e-9);
        // byte 100 is 25 counts above centre, one division at 1 V/div
        let ch2 = df.column("ch2").unwrap().f64().unwrap();
        assert!((ch2.get(599).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_only_grabbed_channels() {
        let mut scope = rigol();
        scope
            .set_active_channels(ChannelMask::none(2).with(2).unwrap())
            .unwrap();
        scope.grab_data().unwrap();
        let df = scope.to_dataframe().unwrap();

        assert_eq!(df.width(), 2);
        assert!(df.column("ch1").is_err());
        assert!(df.column(&channel_column_name(2)).is_ok());
    }
}
