use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::fmt::Write;
use std::fmt::{self, Debug, Display};
use std::io::{self, Read};

#[derive(PartialOrd, PartialEq, Eq, Clone, Hash)]
pub struct Sid {
    revision: u8,
    number_of_elements: u8,
    // The 48-bit authority is stored in big-endian order.
    authority_high: u32,
    authority_low: u16,
    elements: Vec<u32>,
}

impl Sid {
    pub fn from_stream<S: Read>(stream: &mut S) -> io::Result<Sid> {
        let revision = stream.read_u8()?;
        let number_of_elements = stream.read_u8()?;
        let authority_high = stream.read_u32::<BigEndian>()?;
        let authority_low = stream.read_u16::<BigEndian>()?;

        let mut elements = Vec::with_capacity(number_of_elements as usize);
        for _ in 0..number_of_elements {
            elements.push(stream.read_u32::<LittleEndian>()?)
        }

        Ok(Sid {
            revision,
            number_of_elements,
            authority_high,
            authority_low,
            elements,
        })
    }

    fn authority(&self) -> u64 {
        (u64::from(self.authority_high) << 16) | u64::from(self.authority_low)
    }

    pub fn to_string(&self) -> String {
        let mut repr = String::new();

        write!(repr, "S-{}-{}", self.revision, self.authority())
            .expect("writing to a String cannot fail");

        for element in self.elements.iter() {
            write!(repr, "-{}", element).expect("writing to a String cannot fail");
        }

        repr
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

impl Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}
