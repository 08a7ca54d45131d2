use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::error::PortError;

//byte stream the transport runs over
//the reader and the writer each own one handle to the same port
pub trait SerialLink: Read + Write + Send{
    fn bytes_available(&mut self) -> io::Result<usize>;
    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>>;
}

impl SerialLink for Box<dyn SerialPort>{
    fn bytes_available(&mut self) -> io::Result<usize>{
        self.bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>>{
        let clone = self.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(clone))
    }
}

pub fn open_link(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialLink>, PortError>{
    let port = serialport::new(port_name, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|source| PortError::Open{ port: port_name.to_string(), source })?;

    Ok(Box::new(port))
}
